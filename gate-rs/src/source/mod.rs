// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Policy sources are the locations of policy rules, rule data and policy
//! configuration. Each of them is materialized into its own directory under
//! a caller owned work directory:
//!
//! ```text
//! <work_dir>/<kind>/<9 hex chars>
//! ```
//!
//! Url backed sources get a fresh directory on every fetch, inline data is
//! content addressed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

pub mod downloader;
pub use downloader::{DownloadError, Downloader, SchemeDownloader};

/// File name the inline rule data is written to.
pub const INLINE_DATA_FILE: &str = "rule_data.json";

/// Length of the unique directory name of a source.
const UNIQUE_DIR_LEN: usize = 9;

/// Next fetch sequence number, mixed into unique directory names.
static FETCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write inline data to {path}")]
    WriteInlineData {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a source carries. The kind is also the name of the subdirectory
/// of the work dir the source is fetched into.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    PartialEq,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Policy rules
    Policy,

    /// Data consumed by the policy rules
    Data,

    /// Policy configuration
    Config,
}

/// A go-getter style source url of the given kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyUrl {
    pub url: String,
    pub kind: PolicyKind,
}

/// Rule data given inline, as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineData {
    source: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicySource {
    Url(PolicyUrl),
    Inline(InlineData),
}

impl PolicySource {
    pub fn url(url: impl Into<String>, kind: PolicyKind) -> Self {
        Self::Url(PolicyUrl {
            url: url.into(),
            kind,
        })
    }

    pub fn inline(source: impl Into<Vec<u8>>) -> Self {
        Self::Inline(InlineData {
            source: source.into(),
        })
    }

    /// Fetch the source into a new directory under `work_dir` and return the
    /// path of that directory. Url backed sources are handed to `downloader`,
    /// inline data is written locally.
    pub async fn get_policy(
        &self,
        work_dir: &Path,
        downloader: &dyn Downloader,
        show_message: bool,
    ) -> Result<PathBuf> {
        match self {
            PolicySource::Url(url) => url.get_policy(work_dir, downloader, show_message).await,
            PolicySource::Inline(data) => data.get_policy(work_dir).await,
        }
    }

    pub fn policy_url(&self) -> String {
        match self {
            PolicySource::Url(url) => url.url.clone(),
            PolicySource::Inline(data) => data.policy_url(),
        }
    }

    pub fn subdir(&self) -> &'static str {
        self.kind().into()
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicySource::Url(url) => url.kind,
            PolicySource::Inline(_) => PolicyKind::Data,
        }
    }
}

impl PolicyUrl {
    async fn get_policy(
        &self,
        work_dir: &Path,
        downloader: &dyn Downloader,
        show_message: bool,
    ) -> Result<PathBuf> {
        let dest = work_dir
            .join(self.kind.as_ref())
            .join(unique_dir(&self.url));

        debug!(
            "Downloading policy files from source url {} to destination {}",
            self.url,
            dest.display()
        );
        downloader.download(&dest, &self.url, show_message).await?;

        Ok(dest)
    }
}

impl InlineData {
    async fn get_policy(&self, work_dir: &Path) -> Result<PathBuf> {
        let digest = hex::encode(Sha256::digest(&self.source));
        let dest = work_dir
            .join(PolicyKind::Data.as_ref())
            .join(&digest[..UNIQUE_DIR_LEN]);

        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(|source| SourceError::CreateDir {
                path: dest.clone(),
                source,
            })?;

        let file = dest.join(INLINE_DATA_FILE);
        // Same directory, same content. The file is read-only once written.
        if let Ok(existing) = tokio::fs::read(&file).await {
            if existing == self.source {
                debug!("Inline data already present at {}", file.display());
                return Ok(dest);
            }
        }

        write_read_only(&file, &self.source)
            .await
            .map_err(|source| SourceError::WriteInlineData { path: file, source })?;

        Ok(dest)
    }

    fn policy_url(&self) -> String {
        format!("data:application/json;base64,{}", STANDARD.encode(&self.source))
    }
}

#[cfg(unix)]
async fn write_read_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o400)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn write_read_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, content).await
}

/// A reasonably unique directory name. The seed is hashed together with
/// the current time and a per-process sequence number, so fetching the same
/// url twice never lands in the same directory.
fn unique_dir(seed: &str) -> String {
    let sequence = FETCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let input = format!("{seed}/{}/{sequence}", Utc::now().to_rfc3339());
    let digest = hex::encode(Sha224::digest(input.as_bytes()));
    digest[..UNIQUE_DIR_LEN].to_string()
}
