// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! What the single-image validation pipeline hands back for one image.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rule::RuleMetadata;

/// Outcome of one policy rule evaluated against one image.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RuleResult {
    pub msg: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl RuleResult {
    /// Build the result of a rule from its extracted metadata. Empty fields
    /// are left out, `title` and `description` are only carried when `info`
    /// is set.
    pub fn from_rule(msg: impl Into<String>, rule: &RuleMetadata, info: bool) -> Self {
        let mut metadata = Map::new();
        let mut put_str = |key: &str, value: &str| {
            if !value.is_empty() {
                metadata.insert(key.to_string(), Value::String(value.to_string()));
            }
        };

        put_str("code", &rule.code);
        put_str("effective_on", &rule.effective_on);
        put_str("solution", &rule.solution);
        if info {
            put_str("title", &rule.title);
            put_str("description", &rule.description);
        }

        for (key, values) in [
            ("collections", &rule.collections),
            ("depends_on", &rule.depends_on),
        ] {
            if !values.is_empty() {
                metadata.insert(key.to_string(), Value::from(values.clone()));
            }
        }

        Self {
            msg: msg.into(),
            metadata,
        }
    }

    /// The rule code this result was produced by, if known.
    pub fn code(&self) -> Option<&str> {
        self.metadata.get("code").and_then(Value::as_str)
    }
}

/// A verified signature or attestation signature of an image.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct EntitySignature {
    #[serde(default)]
    pub keyid: String,

    #[serde(default)]
    pub sig: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    /// The image reference as resolved by the pipeline, usually pinned by
    /// digest.
    #[serde(default)]
    pub image_url: String,

    #[serde(default)]
    pub violations: Vec<RuleResult>,

    #[serde(default)]
    pub warnings: Vec<RuleResult>,

    #[serde(default)]
    pub successes: Vec<RuleResult>,

    #[serde(default)]
    pub signatures: Vec<EntitySignature>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rule::RuleKind;

    fn rule() -> RuleMetadata {
        RuleMetadata {
            code: "attestation_type.known_attestation_type".into(),
            title: "Known attestation type found".into(),
            description: "Confirm the attestation has a known type.".into(),
            kind: RuleKind::Deny,
            short_name: "known_attestation_type".into(),
            effective_on: "2022-01-01T00:00:00Z".into(),
            solution: String::new(),
            collections: vec!["minimal".into()],
            depends_on: vec![],
        }
    }

    #[test]
    fn test_from_rule() {
        let result = RuleResult::from_rule("Unknown attestation type", &rule(), false);

        assert_eq!(result.code(), Some("attestation_type.known_attestation_type"));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "msg": "Unknown attestation type",
                "metadata": {
                    "code": "attestation_type.known_attestation_type",
                    "effective_on": "2022-01-01T00:00:00Z",
                    "collections": ["minimal"],
                }
            })
        );
    }

    #[test]
    fn test_from_rule_with_info() {
        let result = RuleResult::from_rule("Unknown attestation type", &rule(), true);

        assert_eq!(
            result.metadata.get("title"),
            Some(&json!("Known attestation type found"))
        );
        assert_eq!(
            result.metadata.get("description"),
            Some(&json!("Confirm the attestation has a known type."))
        );
    }

    #[test]
    fn test_from_empty_rule() {
        let result = RuleResult::from_rule("failed", &RuleMetadata::default(), true);

        assert_eq!(result.code(), None);
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"msg": "failed"}));
    }

    #[test]
    fn test_output_deserialize() {
        let output: Output = serde_json::from_value(json!({
            "imageUrl": "registry.io/repo/image@sha256:abc",
            "violations": [{"msg": "bad", "metadata": {"code": "a.b"}}],
            "signatures": [{"keyid": "k", "sig": "s"}],
        }))
        .unwrap();

        assert_eq!(output.image_url, "registry.io/repo/image@sha256:abc");
        assert_eq!(output.violations[0].code(), Some("a.b"));
        assert!(output.warnings.is_empty());
        assert_eq!(output.signatures[0].keyid, "k");
    }
}
