// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use gate_rs::rule::{scan_directory, RuleInfo};
use gate_rs::source::{PolicyKind, PolicySource, SchemeDownloader};
use gate_rs::work_dir::WorkDir;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::Interrupted;
use crate::config::GateConfig;

#[derive(Subcommand)]
pub enum InspectTarget {
    /// Print the metadata of the rules found in policy sources as JSON
    Policy(InspectPolicyArgs),
}

#[derive(Args)]
pub struct InspectPolicyArgs {
    /// Policy source url, may be repeated
    #[arg(short, long, required = true)]
    source: Vec<String>,
}

pub async fn run(
    target: InspectTarget,
    config: &GateConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let InspectTarget::Policy(args) = target;

    let work_dir = WorkDir::create_in(&config.work_dir).context("create work dir")?;
    let rules = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Interrupted.into()),
        rules = collect_rules(&args.source, &work_dir) => rules?,
    };

    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

async fn collect_rules(sources: &[String], work_dir: &WorkDir) -> Result<Vec<RuleInfo>> {
    let downloader = SchemeDownloader::new();

    let mut rules: Vec<RuleInfo> = Vec::new();
    for url in sources {
        let source = PolicySource::url(url.as_str(), PolicyKind::Policy);
        let dir = source
            .get_policy(work_dir.path(), &downloader, true)
            .await
            .with_context(|| format!("fetch policy source {url}"))?;
        debug!("Inspecting policy source {url} in {}", dir.display());

        let found = scan_directory(&dir).with_context(|| format!("inspect policy source {url}"))?;
        rules.extend(found.into_iter().map(|mut rule| {
            if let Ok(relative) = rule.file.strip_prefix(&dir) {
                rule.file = relative.to_path_buf();
            }
            rule
        }));
    }

    Ok(rules)
}
