// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Locating the policy configuration given by the user.

use std::path::{Path, PathBuf};

use log::debug;

use super::{PolicyError, Result};
use crate::source::{Downloader, PolicyKind, PolicySource};
use crate::work_dir::WorkDir;

/// Name of the configuration file expected in a git hosted config source.
pub const POLICY_CONFIG_FILE: &str = "policy.yaml";

const GIT_PREFIXES: [&str; 3] = ["git::", "github.com/", "https://github.com/"];

const CONFIG_FILE_SUFFIXES: [&str; 3] = [".yaml", ".yml", ".json"];

/// Turn a policy configuration reference into configuration text.
///
/// - a git hosted reference is fetched into a scoped work dir under
///   `work_root` and its `policy.yaml` is read;
/// - a path to a `.yaml`, `.yml` or `.json` file is read;
/// - anything else is returned as is, taken to be inline configuration.
pub async fn load_policy_configuration(
    reference: &str,
    work_root: &Path,
    downloader: &dyn Downloader,
) -> Result<String> {
    if GIT_PREFIXES.iter().any(|p| reference.starts_with(p)) {
        debug!("Loading policy configuration from git url {reference}");
        let work_dir = WorkDir::create_in(work_root).map_err(PolicyError::WorkDir)?;
        let config_dir = PolicySource::url(reference, PolicyKind::Config)
            .get_policy(work_dir.path(), downloader, false)
            .await?;
        debug!(
            "Downloaded config from {reference} to {}",
            config_dir.display()
        );

        let config_file = config_dir.join(POLICY_CONFIG_FILE);
        if !config_file.is_file() {
            return Err(PolicyError::MissingPolicyYaml(reference.to_string()));
        }

        return read_config_file(config_file).await;
    }

    if CONFIG_FILE_SUFFIXES.iter().any(|s| reference.ends_with(s)) {
        return read_config_file(PathBuf::from(reference)).await;
    }

    Ok(reference.to_string())
}

async fn read_config_file(path: PathBuf) -> Result<String> {
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| PolicyError::ReadConfiguration {
            path: path.clone(),
            source,
        })?;
    if text.is_empty() {
        return Err(PolicyError::EmptyConfigurationFile(path));
    }

    Ok(text)
}
