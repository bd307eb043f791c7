// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Reading rule annotations out of rego modules.
//!
//! A rule annotation is a YAML document written as a comment block that
//! starts with `# METADATA` and directly precedes the rule:
//!
//! ```text
//! package policy.release.attestation_type
//!
//! # METADATA
//! # title: Known attestation type found
//! # custom:
//! #   short_name: known_attestation_type
//! deny contains result if { ... }
//! ```

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use walkdir::WalkDir;

use super::{RuleAnnotation, RuleMetadata};

const METADATA_MARKER: &str = "# METADATA";

const REGO_EXTENSION: &str = "rego";

const REGO_TEST_SUFFIX: &str = "_test.rego";

pub type Result<T> = std::result::Result<T, AnnotationError>;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("invalid METADATA block of rule {rule} at line {line}")]
    InvalidMetadata {
        rule: String,
        line: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid rego module {path}")]
    InvalidModule {
        path: PathBuf,
        #[source]
        source: Box<AnnotationError>,
    },

    #[error("failed to read {path}")]
    Read {
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
}

/// The fields of a `METADATA` block this crate cares about.
#[derive(Default, Deserialize)]
struct MetadataBlock {
    title: Option<String>,
    description: Option<String>,
    custom: Option<Map<String, Value>>,
}

/// Metadata of one rule found in a policy directory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleInfo {
    pub file: PathBuf,
    pub package: String,
    #[serde(flatten)]
    pub metadata: RuleMetadata,
}

/// All the rule annotations of a rego module, in order of appearance.
/// Rules without a `METADATA` block are not listed.
pub fn annotations_from_module(module: &str) -> Result<Vec<RuleAnnotation>> {
    let mut package = String::new();
    let mut annotations = Vec::new();
    let mut lines = module.lines().enumerate().peekable();

    while let Some((index, line)) = lines.next() {
        let line = line.trim();
        if let Some(path) = line.strip_prefix("package ") {
            package = path.trim().to_string();
            continue;
        }

        if line != METADATA_MARKER {
            continue;
        }

        let mut yaml = String::new();
        while let Some((_, next)) = lines.peek() {
            let Some(comment) = next.trim_start().strip_prefix('#') else {
                break;
            };
            yaml.push_str(comment.strip_prefix(' ').unwrap_or(comment));
            yaml.push('\n');
            lines.next();
        }

        // Blocks not followed by a rule (package or document scope) are
        // skipped, the following line is handled by the outer loop.
        let Some(rule_name) = lines.peek().and_then(|(_, head)| rule_head_name(head)) else {
            continue;
        };

        let block = if yaml.trim().is_empty() {
            MetadataBlock::default()
        } else {
            serde_yaml::from_str::<MetadataBlock>(&yaml).map_err(|source| {
                AnnotationError::InvalidMetadata {
                    rule: rule_name.clone(),
                    line: index + 1,
                    source,
                }
            })?
        };

        annotations.push(RuleAnnotation {
            package: package.clone(),
            rule_name,
            title: block.title,
            description: block.description,
            custom: block.custom,
        });
    }

    Ok(annotations)
}

fn rule_head_name(line: &str) -> Option<String> {
    let line = line.trim_start();
    let line = line.strip_prefix("default ").unwrap_or(line).trim_start();
    let name: String = line
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    match name.as_str() {
        "" | "package" | "import" => None,
        _ => Some(name),
    }
}

/// Extract the metadata of every annotated rule found in the rego modules
/// under `dir`. Test modules are ignored.
pub fn scan_directory(dir: &Path) -> Result<Vec<RuleInfo>> {
    let mut rules = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| AnnotationError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_module = entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == REGO_EXTENSION)
            && !path.to_string_lossy().ends_with(REGO_TEST_SUFFIX);
        if !is_module {
            continue;
        }

        debug!("Reading rule annotations from {}", path.display());
        let module = std::fs::read_to_string(path).map_err(|source| AnnotationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let annotations =
            annotations_from_module(&module).map_err(|source| AnnotationError::InvalidModule {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?;

        rules.extend(annotations.iter().map(|annotation| RuleInfo {
            file: path.to_path_buf(),
            package: annotation.package.clone(),
            metadata: RuleMetadata::from(annotation),
        }));
    }

    Ok(rules)
}
