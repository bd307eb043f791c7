// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Rule metadata extraction.
//!
//! Policy rules carry a `METADATA` annotation block. This module turns such a
//! block, or the lack of it, into a [`RuleMetadata`]. Extraction never fails:
//! every field falls back to its empty value when the annotation, or the
//! relevant part of it, is missing.

use chrono::{DateTime, NaiveDate, SecondsFormat};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

pub mod rego;
pub use rego::{annotations_from_module, scan_directory, AnnotationError, RuleInfo};

/// Package segment under which policy rules are conventionally authored.
const POLICY_NAMESPACE: &str = "policy";

/// Package segment carrying data rules. It is kept in the rule code.
const DATA_NAMESPACE: &str = "data";

/// Categories dropped from the rule code.
const KNOWN_CATEGORIES: [&str; 4] = ["release", "pipeline", "task", "build_task"];

/// Matches `xref:doc.adoc#anchor[text]` and `xref:attachment$file.yml[text]`.
lazy_static! {
    static ref XREF: Regex =
        Regex::new(r"xref:[^\s\[\]]+\[([^\]]*)\]").expect("xref pattern must compile");
}

/// The parsed annotation block attached to one policy rule, together with
/// the package path and head name of that rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleAnnotation {
    /// Dotted package path of the module declaring the rule,
    /// e.g. `policy.release.attestation_type`.
    pub package: String,

    /// Declared head name of the rule, e.g. `deny`.
    pub rule_name: String,

    pub title: Option<String>,

    pub description: Option<String>,

    /// The `custom` map of the annotation.
    pub custom: Option<Map<String, Value>>,
}

impl RuleAnnotation {
    fn package_segments(&self) -> Vec<&str> {
        self.package
            .split('.')
            .map(|segment| segment.trim_matches('"'))
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    fn custom(&self, key: &str) -> Option<&Value> {
        self.custom.as_ref()?.get(key)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, EnumString, Eq, Hash, PartialEq, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Deny,
    Warn,
    #[default]
    Other,
}

/// Display and classification metadata of a policy rule.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleMetadata {
    pub code: String,
    pub title: String,
    pub description: String,
    pub kind: RuleKind,
    pub short_name: String,
    pub effective_on: String,
    pub solution: String,
    pub collections: Vec<String>,
    pub depends_on: Vec<String>,
}

impl RuleMetadata {
    pub fn from_annotation(annotation: Option<&RuleAnnotation>) -> Self {
        Self {
            code: code(annotation),
            title: title(annotation),
            description: description(annotation),
            kind: kind(annotation),
            short_name: short_name(annotation),
            effective_on: effective_on(annotation),
            solution: solution(annotation),
            collections: collections(annotation),
            depends_on: depends_on(annotation),
        }
    }
}

impl From<&RuleAnnotation> for RuleMetadata {
    fn from(annotation: &RuleAnnotation) -> Self {
        Self::from_annotation(Some(annotation))
    }
}

pub fn title(annotation: Option<&RuleAnnotation>) -> String {
    annotation
        .and_then(|a| a.title.clone())
        .unwrap_or_default()
}

pub fn description(annotation: Option<&RuleAnnotation>) -> String {
    annotation
        .and_then(|a| a.description.as_deref())
        .map(resolve_xrefs)
        .unwrap_or_default()
}

/// The kind only depends on the head name of the rule.
pub fn kind(annotation: Option<&RuleAnnotation>) -> RuleKind {
    match annotation.map(|a| a.rule_name.as_str()) {
        Some("deny") => RuleKind::Deny,
        Some("warn") => RuleKind::Warn,
        _ => RuleKind::Other,
    }
}

pub fn short_name(annotation: Option<&RuleAnnotation>) -> String {
    custom_string(annotation, "short_name")
}

/// The date after which the rule is enforced, as RFC3339.
pub fn effective_on(annotation: Option<&RuleAnnotation>) -> String {
    match annotation.and_then(|a| a.custom("effective_on")) {
        Some(Value::String(value)) => normalize_time(value),
        _ => String::new(),
    }
}

pub fn solution(annotation: Option<&RuleAnnotation>) -> String {
    resolve_xrefs(&custom_string(annotation, "solution"))
}

/// Named groupings of the rule, duplicates removed.
pub fn collections(annotation: Option<&RuleAnnotation>) -> Vec<String> {
    let mut collections = custom_strings(annotation, "collections");
    let mut seen = std::collections::HashSet::new();
    collections.retain(|c| seen.insert(c.clone()));
    collections
}

pub fn depends_on(annotation: Option<&RuleAnnotation>) -> Vec<String> {
    custom_strings(annotation, "depends_on")
}

/// The stable rule code, `<namespace>.<short_name>`.
///
/// The namespace is the package path without the leading `policy` segment
/// and without a known category (`release`, `pipeline`, `task`,
/// `build_task`) following it. A `data` namespace is kept as it is.
pub fn code(annotation: Option<&RuleAnnotation>) -> String {
    let Some(annotation) = annotation else {
        return String::new();
    };

    let short_name = short_name(Some(annotation));
    if short_name.is_empty() {
        return String::new();
    }

    let segments = annotation.package_segments();
    let namespace = match segments.as_slice() {
        [POLICY_NAMESPACE, rest @ ..] => rest,
        all => all,
    };
    let namespace = match namespace {
        [DATA_NAMESPACE, ..] => namespace,
        [category, rest @ ..] if KNOWN_CATEGORIES.contains(category) => rest,
        _ => namespace,
    };

    namespace
        .iter()
        .copied()
        .chain(std::iter::once(short_name.as_str()))
        .collect::<Vec<_>>()
        .join(".")
}

fn custom_string(annotation: Option<&RuleAnnotation>, key: &str) -> String {
    match annotation.and_then(|a| a.custom(key)) {
        Some(Value::String(value)) => value.clone(),
        _ => String::new(),
    }
}

/// A single string becomes a one element list.
fn custom_strings(annotation: Option<&RuleAnnotation>, key: &str) -> Vec<String> {
    match annotation.and_then(|a| a.custom(key)) {
        Some(Value::String(value)) => vec![value.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Replace asciidoc cross references with their display text.
fn resolve_xrefs(text: &str) -> String {
    XREF.replace_all(text, "$1").into_owned()
}

fn normalize_time(value: &str) -> String {
    let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return time.to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return midnight
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    value.to_string()
}
