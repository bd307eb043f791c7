// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Single image validation delegated to an external program.

use std::io::ErrorKind;
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use gate_rs::output::Output;
use gate_rs::policy::Policy;
use gate_rs::validate::ImageValidator;
use log::debug;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ValidatorConfig;

#[derive(Serialize)]
struct ValidationRequest<'a> {
    image: &'a str,
    policy: &'a Policy,
    info: bool,
}

/// Runs the configured program once per image.
#[derive(Clone, Debug)]
pub struct CommandValidator {
    command: String,
    args: Vec<String>,
}

impl CommandValidator {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        if config.command.is_empty() {
            bail!("no validator command configured, set `validator.command` in the config file");
        }

        Ok(Self {
            command: config.command.clone(),
            args: config.args.clone(),
        })
    }
}

#[async_trait]
impl ImageValidator for CommandValidator {
    async fn validate(&self, image: &str, policy: &Policy, info: bool) -> Result<Output> {
        let request = serde_json::to_vec(&ValidationRequest {
            image,
            policy,
            info,
        })?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run validator {}", self.command))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            anyhow!("Failed to get stdin from the command thus failed to write inputs to the command")
        })?;
        // Fed while stdout and stderr are drained, the validator may write
        // before it reads.
        let feed = tokio::spawn(async move {
            match stdin.write_all(&request).await {
                // The validator may exit without reading its input.
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        });

        let output = child.wait_with_output().await?;
        feed.await?.context("failed to write validation request")?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(
                "validator {} failed with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            );
        }

        debug!(
            "validator {} for image {image} \n\t stderr: {}",
            self.command,
            stderr.replace('\n', "\n\t")
        );
        serde_json::from_slice(&output.stdout).context("invalid validator output")
    }
}
