// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use gate_rs::policy::{load_policy_configuration, Identity, Policy, PolicyOptions};
use gate_rs::report::Report;
use gate_rs::snapshot::{determine_input_spec, Input};
use gate_rs::source::SchemeDownloader;
use gate_rs::validate::ComponentValidator;
use gate_rs::work_dir::WorkDir;
use log::{debug, info};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::Interrupted;
use crate::config::GateConfig;
use crate::validator::CommandValidator;

/// Failure of a run whose images could all be validated.
#[derive(Error, Debug)]
pub enum PolicyFailure {
    #[error("success criteria not met")]
    SuccessCriteriaNotMet,
}

#[derive(Subcommand)]
pub enum ValidateTarget {
    /// Validate conformance of container images with a policy
    ///
    /// For each image, the signature is verified first, then the
    /// attestations, and last the attestations are evaluated against the
    /// policy rules. All images are validated, even when some of them fail.
    Image(ValidateImageArgs),
}

#[derive(Args)]
pub struct ValidateImageArgs {
    /// OCI image reference
    #[arg(short, long)]
    image: Option<String>,

    /// Path to a snapshot file listing the components to validate
    #[arg(short, long)]
    file_path: Option<PathBuf>,

    /// Snapshot listing the components to validate, as JSON or YAML
    #[arg(short, long)]
    json_input: Option<String>,

    /// Policy configuration: inline JSON or YAML, a path to a file, or a git
    /// url of a repository holding a policy.yaml
    #[arg(short, long)]
    policy: String,

    /// Public key to verify signatures with, overrides the policy's
    #[arg(short = 'k', long)]
    public_key: Option<String>,

    /// Rekor instance to look up transparency log entries in, overrides the
    /// policy's
    #[arg(short, long)]
    rekor_url: Option<String>,

    /// Expected identity in the keyless signing certificate
    #[arg(long)]
    certificate_identity: Option<String>,

    /// Regular expression the identity in the keyless signing certificate must match
    #[arg(long)]
    certificate_identity_regexp: Option<String>,

    /// Expected OIDC issuer in the keyless signing certificate
    #[arg(long)]
    certificate_oidc_issuer: Option<String>,

    /// Regular expression the OIDC issuer in the keyless signing certificate must match
    #[arg(long)]
    certificate_oidc_issuer_regexp: Option<String>,

    /// Time the policy is evaluated at: "now", "attestation" or an RFC3339 time
    #[arg(long, default_value = "now")]
    effective_time: String,

    /// Include rule titles and descriptions in the output
    #[arg(long)]
    info: bool,

    /// Fail when the validation is not successful
    #[arg(short, long)]
    strict: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl ValidateImageArgs {
    fn policy_options(&self) -> PolicyOptions {
        PolicyOptions {
            public_key: self.public_key.clone(),
            rekor_url: self.rekor_url.clone(),
            identity: Identity {
                issuer: self.certificate_oidc_issuer.clone().unwrap_or_default(),
                issuer_reg_exp: self
                    .certificate_oidc_issuer_regexp
                    .clone()
                    .unwrap_or_default(),
                subject: self.certificate_identity.clone().unwrap_or_default(),
                subject_reg_exp: self.certificate_identity_regexp.clone().unwrap_or_default(),
            },
            effective_time: Some(self.effective_time.clone()),
        }
    }
}

pub async fn run(
    target: ValidateTarget,
    config: &GateConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let ValidateTarget::Image(args) = target;

    let spec = determine_input_spec(Input {
        file: args.file_path.clone(),
        json: args.json_input.clone(),
        image: args.image.clone(),
    })
    .await?;
    let validator = CommandValidator::new(&config.validator)?;

    let work_dir = WorkDir::create_in(&config.work_dir).context("create work dir")?;
    // Dropping the pending fetches on cancellation leaves `work_dir` to be
    // removed on return.
    let policy = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Interrupted.into()),
        policy = load_policy(&args, config, &work_dir) => policy?,
    };

    let mut components = ComponentValidator::new(Arc::new(validator));
    if let Some(limit) = config.max_concurrent_validations {
        debug!("Validating at most {limit} components at a time");
        components = components.with_concurrency_limit(limit);
    }

    info!(
        "Validating {} components of application {:?}",
        spec.components.len(),
        spec.application
    );
    let report = components
        .validate(cancel, &spec.components, Arc::new(policy), args.info)
        .await?;
    write_report(&report, args.output.as_ref()).await?;

    if args.strict && !report.success {
        return Err(PolicyFailure::SuccessCriteriaNotMet.into());
    }

    Ok(())
}

async fn load_policy(
    args: &ValidateImageArgs,
    config: &GateConfig,
    work_dir: &WorkDir,
) -> Result<Policy> {
    let downloader = SchemeDownloader::new();
    let policy_text = load_policy_configuration(&args.policy, &config.work_dir, &downloader)
        .await
        .context("load policy configuration")?;
    let mut policy = Policy::new(&policy_text, args.policy_options())?;
    policy
        .resolve_sources(work_dir.path(), &downloader)
        .await
        .context("resolve policy sources")?;
    Ok(policy)
}

async fn write_report(report: &Report, output: Option<&PathBuf>) -> Result<()> {
    let json = report.to_json()?;
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("write report to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
