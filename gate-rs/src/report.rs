// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::output::{EntitySignature, Output, RuleResult};
use crate::policy::Policy;
use crate::snapshot::SnapshotComponent;

/// The validation outcome of one component.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(flatten)]
    pub component: SnapshotComponent,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<RuleResult>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RuleResult>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub successes: Vec<RuleResult>,

    pub success: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<EntitySignature>,
}

impl Component {
    /// A component is successful when its validation reported no violation.
    /// The image is recorded as resolved by the validation, if it did.
    pub fn new(mut component: SnapshotComponent, output: Output) -> Self {
        if !output.image_url.is_empty() {
            component.container_image = output.image_url;
        }

        Self {
            component,
            success: output.violations.is_empty(),
            violations: output.violations,
            warnings: output.warnings,
            successes: output.successes,
            signatures: output.signatures,
        }
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub success: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub rekor_url: String,

    #[serde(serialize_with = "serialize_time")]
    pub effective_time: DateTime<Utc>,

    pub components: Vec<Component>,
}

impl Report {
    pub fn new(components: Vec<Component>, policy: &Policy) -> Self {
        Self {
            success: components.iter().all(|c| c.success),
            key: policy.public_key().to_string(),
            rekor_url: policy.rekor_url().to_string(),
            effective_time: policy.effective_instant(),
            components,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_time<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}
