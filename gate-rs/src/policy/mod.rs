// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The policy images are validated against: the key material signatures
//! are checked with, the time rules are evaluated at, and the groups of
//! policy rule and rule data sources.
//!
//! A [`Policy`] is built once per run and then only read; its sources are
//! materialized with [`Policy::resolve_sources`] before any image is
//! validated.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

use crate::source::{Downloader, PolicyKind, PolicySource, SourceError};

pub mod config;
pub use config::load_policy_configuration;

/// Key the inline rule data of a source group is nested under.
pub const RULE_DATA_KEY: &str = "rule_data__configuration__";

const EFFECTIVE_TIME_NOW: &str = "now";

const EFFECTIVE_TIME_ATTESTATION: &str = "attestation";

pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy configuration is empty")]
    EmptyConfiguration,

    #[error("unable to parse policy configuration")]
    InvalidConfiguration(#[source] serde_yaml::Error),

    #[error("policy must have a public key or a keyless identity (issuer and subject)")]
    MissingKeyMaterial,

    #[error("invalid effective time {0}, expected \"now\", \"attestation\" or an RFC3339 time")]
    InvalidEffectiveTime(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("The config source {0} did not contain a policy.yaml file")]
    MissingPolicyYaml(String),

    #[error("failed to read policy configuration {path}")]
    ReadConfiguration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file {0} is empty")]
    EmptyConfigurationFile(PathBuf),

    #[error("failed to create work dir")]
    WorkDir(#[source] std::io::Error),
}

/// Keyless signing identity: who must have signed, as attested by which
/// OIDC issuer. Either value may be given literally or as a regular
/// expression.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_reg_exp: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject_reg_exp: String,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.issuer.is_empty()
            && self.issuer_reg_exp.is_empty()
            && self.subject.is_empty()
            && self.subject_reg_exp.is_empty()
    }

    /// Both the issuer and the subject are constrained.
    pub fn is_complete(&self) -> bool {
        (!self.issuer.is_empty() || !self.issuer_reg_exp.is_empty())
            && (!self.subject.is_empty() || !self.subject_reg_exp.is_empty())
    }
}

/// A named group of policy rule and rule data sources.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub policy: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_data: Option<Value>,
}

impl SourceGroup {
    /// The sources of the group: policy urls, then data urls, then the
    /// inline rule data if any.
    pub fn policy_sources(&self) -> Vec<PolicySource> {
        let policies = self
            .policy
            .iter()
            .map(|url| PolicySource::url(url.as_str(), PolicyKind::Policy));
        let data = self
            .data
            .iter()
            .map(|url| PolicySource::url(url.as_str(), PolicyKind::Data));
        let rule_data = self.rule_data.as_ref().map(|rule_data| {
            PolicySource::inline(json!({ RULE_DATA_KEY: rule_data }).to_string())
        });

        policies.chain(data).chain(rule_data).collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rekor_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,

    #[serde(default)]
    pub sources: Vec<SourceGroup>,
}

impl PolicySpec {
    /// Parse a policy spec written in JSON or YAML. A full resource document
    /// is accepted too, its `spec` is used.
    pub fn from_text(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(PolicyError::EmptyConfiguration);
        }

        let mut document: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(PolicyError::InvalidConfiguration)?;
        if let Some(spec) = document.get("spec").cloned() {
            document = spec;
        }

        serde_yaml::from_value(document).map_err(PolicyError::InvalidConfiguration)
    }
}

/// The point in time policy rules are evaluated at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectiveTime {
    /// When the policy was loaded
    #[default]
    Now,

    /// When the attestation was created
    Attestation,

    At(DateTime<Utc>),
}

impl FromStr for EffectiveTime {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | EFFECTIVE_TIME_NOW => Ok(Self::Now),
            EFFECTIVE_TIME_ATTESTATION => Ok(Self::Attestation),
            other => DateTime::parse_from_rfc3339(other)
                .map(|t| Self::At(t.with_timezone(&Utc)))
                .map_err(|_| PolicyError::InvalidEffectiveTime(other.to_string())),
        }
    }
}

impl fmt::Display for EffectiveTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str(EFFECTIVE_TIME_NOW),
            Self::Attestation => f.write_str(EFFECTIVE_TIME_ATTESTATION),
            Self::At(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl Serialize for EffectiveTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Settings given by the caller that take precedence over the ones of the
/// policy configuration.
#[derive(Clone, Debug, Default)]
pub struct PolicyOptions {
    pub public_key: Option<String>,
    pub rekor_url: Option<String>,
    pub identity: Identity,
    pub effective_time: Option<String>,
}

/// A policy source materialized in the work dir.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    pub kind: PolicyKind,
    pub url: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(flatten)]
    spec: PolicySpec,

    effective_time: EffectiveTime,

    #[serde(skip)]
    loaded_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    resolved_sources: Vec<ResolvedSource>,
}

impl Policy {
    pub fn new(config_text: &str, options: PolicyOptions) -> Result<Self> {
        let mut spec = PolicySpec::from_text(config_text)?;

        if let Some(key) = options.public_key.filter(|k| !k.is_empty()) {
            debug!("Using public key given as option");
            spec.public_key = key;
        }
        if let Some(rekor_url) = options.rekor_url.filter(|u| !u.is_empty()) {
            spec.rekor_url = rekor_url;
        }
        if !options.identity.is_empty() {
            spec.identity = Some(options.identity);
        }

        let keyless = spec.identity.as_ref().is_some_and(Identity::is_complete);
        if spec.public_key.is_empty() && !keyless {
            return Err(PolicyError::MissingKeyMaterial);
        }

        let effective_time = options
            .effective_time
            .as_deref()
            .unwrap_or_default()
            .parse()?;

        Ok(Self {
            spec,
            effective_time,
            loaded_at: Utc::now(),
            resolved_sources: Vec::new(),
        })
    }

    /// Fetch every source of every group into `work_dir`. Done once, before
    /// the policy is shared with concurrent validations.
    pub async fn resolve_sources(
        &mut self,
        work_dir: &Path,
        downloader: &dyn Downloader,
    ) -> Result<()> {
        let mut resolved = Vec::new();
        for group in &self.spec.sources {
            for source in group.policy_sources() {
                let path = source.get_policy(work_dir, downloader, false).await?;
                debug!(
                    "Resolved {} source {} of group {:?} to {}",
                    source.kind(),
                    source.policy_url(),
                    group.name,
                    path.display()
                );
                resolved.push(ResolvedSource {
                    kind: source.kind(),
                    url: source.policy_url(),
                    path,
                });
            }
        }

        info!("Resolved {} policy sources", resolved.len());
        self.resolved_sources = resolved;
        Ok(())
    }

    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    pub fn public_key(&self) -> &str {
        &self.spec.public_key
    }

    pub fn rekor_url(&self) -> &str {
        &self.spec.rekor_url
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.spec.identity.as_ref()
    }

    pub fn effective_time(&self) -> EffectiveTime {
        self.effective_time
    }

    /// The instant rules are evaluated at when it does not depend on an
    /// attestation.
    pub fn effective_instant(&self) -> DateTime<Utc> {
        match self.effective_time {
            EffectiveTime::At(t) => t,
            EffectiveTime::Now | EffectiveTime::Attestation => self.loaded_at,
        }
    }

    pub fn resolved_sources(&self) -> &[ResolvedSource] {
        &self.resolved_sources
    }

    /// Directories holding sources of the given kind.
    pub fn source_dirs(&self, kind: PolicyKind) -> impl Iterator<Item = &Path> {
        self.resolved_sources
            .iter()
            .filter(move |s| s.kind == kind)
            .map(|s| s.path.as_path())
    }
}
