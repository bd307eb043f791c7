// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! This module helps to fetch policy sources using different
//! protocols. The transport is chosen due to the scheme of the
//! source url. Now, it supports the following:
//!
//! - no scheme or `file://`: from the local filesystem
//! - `http://` or `https://`: a single file fetched over http
//!
//! Other transports (git, OCI bundles, ...) are plugged in by
//! implementing [`Downloader`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use url::Url;
use walkdir::WalkDir;

/// File name used when a downloaded url does not end with a path segment.
#[cfg(feature = "http-download")]
const DEFAULT_DOWNLOAD_NAME: &str = "download";

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("failed to parse source url {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("not support scheme {0}")]
    UnsupportedScheme(String),

    #[error("source {0} does not exist")]
    NotFound(PathBuf),

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[cfg(feature = "http-download")]
    #[error("failed to fetch {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Internal async runtime error for tokio")]
    RuntimeError(#[from] tokio::task::JoinError),
}

/// A transport able to populate a local directory from a source url.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Populate `dest` with the files found at `source_url`. `dest` may not
    /// exist yet, implementations create it. When `show_message` is set the
    /// transfer should be reported to the user.
    async fn download(&self, dest: &Path, source_url: &str, show_message: bool) -> Result<()>;
}

/// The default [`Downloader`], dispatching on the url scheme.
#[derive(Clone, Debug, Default)]
pub struct SchemeDownloader {
    #[cfg(feature = "http-download")]
    client: reqwest::Client,
}

impl SchemeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "http-download")]
    async fn fetch_http(&self, url: &Url, dest: &Path) -> Result<()> {
        let http_error = |source: reqwest::Error| DownloadError::Http {
            url: url.to_string(),
            source,
        };

        let body = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(http_error)?
            .error_for_status()
            .map_err(http_error)?
            .bytes()
            .await
            .map_err(http_error)?;

        let name = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DOWNLOAD_NAME);

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|source| DownloadError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        let target = dest.join(name);
        tokio::fs::write(&target, &body)
            .await
            .map_err(|source| DownloadError::Write {
                path: target,
                source,
            })
    }
}

#[async_trait]
impl Downloader for SchemeDownloader {
    async fn download(&self, dest: &Path, source_url: &str, show_message: bool) -> Result<()> {
        if show_message {
            info!("Downloading {source_url} ...");
        } else {
            debug!("Downloading {source_url} into {}", dest.display());
        }

        // go-getter style forced getters, e.g. `git::https://...`
        if let Some((getter, _)) = source_url.split_once("::") {
            if !getter.contains('/') {
                return Err(DownloadError::UnsupportedScheme(getter.to_string()));
            }
        }

        if !source_url.contains("://") {
            return copy_local(Path::new(source_url), dest).await;
        }

        let url = Url::parse(source_url).map_err(|source| DownloadError::InvalidUrl {
            url: source_url.to_string(),
            source,
        })?;
        match url.scheme() {
            "file" => copy_local(Path::new(url.path()), dest).await,
            "http" | "https" => {
                #[cfg(feature = "http-download")]
                {
                    self.fetch_http(&url, dest).await
                }

                #[cfg(not(feature = "http-download"))]
                {
                    Err(DownloadError::UnsupportedScheme(url.scheme().to_string()))
                }
            }
            others => Err(DownloadError::UnsupportedScheme(others.to_string())),
        }
    }
}

async fn copy_local(from: &Path, dest: &Path) -> Result<()> {
    let from = from.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree(&from, &dest)).await?
}

/// Copy a file into `dest`, or the content of a directory recursively.
fn copy_tree(from: &Path, dest: &Path) -> Result<()> {
    if !from.exists() {
        return Err(DownloadError::NotFound(from.to_path_buf()));
    }

    let write_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DownloadError::Write { path, source }
    };

    std::fs::create_dir_all(dest).map_err(write_error(dest))?;

    if from.is_file() {
        let name = from
            .file_name()
            .ok_or_else(|| DownloadError::NotFound(from.to_path_buf()))?;
        let target = dest.join(name);
        std::fs::copy(from, &target).map_err(write_error(&target))?;
        return Ok(());
    }

    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|source| DownloadError::Walk {
            path: from.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(write_error(&target))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(write_error(&target))?;
        }
    }

    Ok(())
}
