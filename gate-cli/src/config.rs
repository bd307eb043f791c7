// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{env, num::NonZeroUsize, path::Path, path::PathBuf};

use anyhow::{bail, Context, Result};
use config::{Config, File};
use gate_rs::GATE_WORK_DIR;
use log::{debug, info};
use serde::Deserialize;

/// Environment variable holding the config file path.
pub const GATE_CONFIG_PATH: &str = "GATE_CONFIG_PATH";

/// The external program validating one image. It is given the image, the
/// policy and the info flag as JSON on stdin, and prints the validation
/// output as JSON on stdout.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Root of the per-run work dirs policy sources are fetched into.
    pub work_dir: PathBuf,

    /// Upper bound of components validated at the same time. Unbounded when
    /// not set, 0 is rejected.
    #[serde(default)]
    pub max_concurrent_validations: Option<NonZeroUsize>,

    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_concurrent_validations: None,
            validator: ValidatorConfig::default(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    env::var_os(GATE_WORK_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
}

impl GateConfig {
    /// The config file is the one named on the command line, else the one
    /// named by `GATE_CONFIG_PATH`. Without either, defaults apply.
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let Some(path) = config_path.or_else(config_path_from_env) else {
            debug!("No gate config file given, using defaults");
            return Ok(Self::default());
        };

        if !Path::new(&path).exists() {
            bail!("Config file {path} not found.")
        }
        info!("Loading gate config from {path}");
        Self::from_file(&path)
    }

    /// The file format follows the extension, e.g. `gate.toml` or
    /// `gate.yaml`. Keys left out keep their default.
    fn from_file(config_path: &str) -> Result<Self> {
        Config::builder()
            .set_default("work_dir", default_work_dir().to_string_lossy().to_string())?
            .add_source(File::with_name(config_path))
            .build()?
            .try_deserialize()
            .context("invalid config")
    }
}

fn config_path_from_env() -> Option<String> {
    let path = env::var(GATE_CONFIG_PATH).ok()?;
    debug!("{GATE_CONFIG_PATH} set to {path}");
    Some(path)
}
