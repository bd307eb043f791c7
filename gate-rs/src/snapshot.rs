// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The release unit to validate: an application made of components, each
//! built into one container image.

use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Component name used when a single image is given on its own.
pub const UNNAMED_COMPONENT: &str = "Unnamed";

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("neither a snapshot file, inline snapshot nor image reference provided to validate")]
    NoInput,

    #[error("failed to read snapshot file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse snapshot {origin}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("snapshot {0} has no components")]
    NoComponents(String),
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotComponent {
    #[serde(default)]
    pub name: String,

    pub container_image: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    #[serde(default)]
    pub application: String,

    #[serde(default)]
    pub components: Vec<SnapshotComponent>,
}

impl SnapshotSpec {
    /// Parse a snapshot spec written in JSON or YAML.
    pub fn from_text(text: &str, origin: &str) -> Result<Self> {
        let spec: SnapshotSpec =
            serde_yaml::from_str(text).map_err(|source| SnapshotError::Parse {
                origin: origin.to_string(),
                source,
            })?;

        if spec.components.is_empty() {
            return Err(SnapshotError::NoComponents(origin.to_string()));
        }

        Ok(spec)
    }
}

/// The ways a caller may name what to validate.
#[derive(Clone, Debug, Default)]
pub struct Input {
    pub file: Option<PathBuf>,
    pub json: Option<String>,
    pub image: Option<String>,
}

/// Pick the snapshot to validate. A snapshot file wins over an inline
/// snapshot, which wins over a single image reference.
pub async fn determine_input_spec(input: Input) -> Result<SnapshotSpec> {
    if let Some(path) = input.file.filter(|p| !p.as_os_str().is_empty()) {
        debug!("Reading snapshot from file {}", path.display());
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SnapshotError::Read {
                path: path.clone(),
                source,
            })?;
        return SnapshotSpec::from_text(&text, &path.display().to_string());
    }

    if let Some(json) = input.json.filter(|j| !j.trim().is_empty()) {
        debug!("Reading inline snapshot");
        return SnapshotSpec::from_text(&json, "input");
    }

    if let Some(image) = input.image.filter(|i| !i.is_empty()) {
        debug!("Validating single image {image}");
        return Ok(SnapshotSpec {
            application: String::new(),
            components: vec![SnapshotComponent {
                name: UNNAMED_COMPONENT.to_string(),
                container_image: image,
            }],
        });
    }

    Err(SnapshotError::NoInput)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SNAPSHOT: &str = r#"{
        "application": "app1",
        "components": [
            {"name": "nodejs", "containerImage": "quay.io/org/nodejs:latest"},
            {"name": "go", "containerImage": "quay.io/org/go:latest"}
        ]
    }"#;

    #[tokio::test]
    async fn test_file_first() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("snapshot.json");
        std::fs::write(&file, SNAPSHOT).unwrap();

        let spec = determine_input_spec(Input {
            file: Some(file),
            json: Some(r#"{"components": [{"containerImage": "x"}]}"#.into()),
            image: Some("registry/image:tag".into()),
        })
        .await
        .expect("read snapshot file");

        assert_eq!(spec.application, "app1");
        assert_eq!(spec.components.len(), 2);
        assert_eq!(spec.components[1].container_image, "quay.io/org/go:latest");
    }

    #[tokio::test]
    async fn test_inline_yaml() {
        let spec = determine_input_spec(Input {
            json: Some("components:\n- name: a\n  containerImage: registry/a:1\n".into()),
            image: Some("registry/image:tag".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(
            spec.components,
            vec![SnapshotComponent {
                name: "a".into(),
                container_image: "registry/a:1".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_single_image() {
        let spec = determine_input_spec(Input {
            image: Some("registry/image:tag".into()),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(spec.components.len(), 1);
        assert_eq!(spec.components[0].name, UNNAMED_COMPONENT);
        assert_eq!(spec.components[0].container_image, "registry/image:tag");
    }

    #[rstest]
    #[case::nothing(Input::default())]
    #[case::all_empty(Input { file: Some(PathBuf::new()), json: Some(" ".into()), image: Some(String::new()) })]
    #[tokio::test]
    async fn test_no_input(#[case] input: Input) {
        let err = determine_input_spec(input).await.unwrap_err();
        assert!(matches!(err, SnapshotError::NoInput));
    }

    #[tokio::test]
    async fn test_no_components() {
        let err = determine_input_spec(Input {
            json: Some(r#"{"application": "app1", "components": []}"#.into()),
            ..Default::default()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SnapshotError::NoComponents(_)));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = determine_input_spec(Input {
            file: Some("/not/there/snapshot.yaml".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SnapshotError::Read { .. }));
    }
}
