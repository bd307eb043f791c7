// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Validation of all the components of a snapshot.
//!
//! Each component is validated by its own task. A component whose
//! validation fails does not stop the others; all tasks are awaited before
//! the outcome is decided:
//!
//! - if any component failed, the failures are returned together and no
//!   report is built;
//! - otherwise a [`Report`] is built, policy violations only turn the
//!   affected components (and the report) unsuccessful.

use std::error::Error as _;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::output::Output;
use crate::policy::Policy;
use crate::report::{Component, Report};
use crate::snapshot::SnapshotComponent;

/// Validates a single image: its signature, its attestations and the
/// attestations against the policy rules, in this order.
#[async_trait]
pub trait ImageValidator: Send + Sync {
    /// A returned error means the image could not be validated at all.
    /// Policy violations are reported in the [`Output`].
    async fn validate(&self, image: &str, policy: &Policy, info: bool) -> anyhow::Result<Output>;
}

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("error validating image {image} of component {name}")]
    Component {
        name: String,
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("validation cancelled")]
    Cancelled,

    #[error("validation task failed")]
    Task(#[from] JoinError),
}

/// All the errors of one validation run, in component order.
#[derive(Debug)]
pub struct ValidationErrors {
    errors: Vec<ValidateError>,
}

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidateError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 {
            "error"
        } else {
            "errors"
        };
        write!(f, "{} {noun} occurred:", self.errors.len())?;

        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
            let mut cause = error.source();
            while let Some(e) = cause {
                write!(f, ": {e}")?;
                cause = e.source();
            }
        }

        f.write_str("\n\n")
    }
}

impl std::error::Error for ValidationErrors {}

/// Fans the validation of snapshot components out to an [`ImageValidator`].
#[derive(Clone)]
pub struct ComponentValidator {
    validator: Arc<dyn ImageValidator>,
    limit: Option<Arc<Semaphore>>,
}

impl ComponentValidator {
    pub fn new(validator: Arc<dyn ImageValidator>) -> Self {
        Self {
            validator,
            limit: None,
        }
    }

    /// Validate at most `limit` components at the same time. By default all
    /// components are validated at once.
    pub fn with_concurrency_limit(mut self, limit: NonZeroUsize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(limit.get())));
        self
    }

    /// Validate every component against `policy`. Cancelling `cancel` makes
    /// the components still running fail.
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        components: &[SnapshotComponent],
        policy: Arc<Policy>,
        info: bool,
    ) -> Result<Report, ValidationErrors> {
        let mut tasks = JoinSet::new();
        for (index, component) in components.iter().cloned().enumerate() {
            let validator = self.validator.clone();
            let limit = self.limit.clone();
            let cancel = cancel.clone();
            let policy = policy.clone();
            tasks.spawn(async move {
                let result =
                    validate_component(validator, limit, cancel, &component, &policy, info).await;
                (index, component, result)
            });
        }

        let mut slots: Vec<Option<Component>> = vec![None; components.len()];
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, component, Ok(output))) => {
                    slots[index] = Some(Component::new(component, output));
                }
                Ok((index, component, Err(source))) => {
                    warn!(
                        "Validation of component {} failed: {source:#}",
                        component.name
                    );
                    errors.push((
                        index,
                        ValidateError::Component {
                            name: component.name,
                            image: component.container_image,
                            source,
                        },
                    ));
                }
                Err(e) => errors.push((usize::MAX, ValidateError::Task(e))),
            }
        }

        if !errors.is_empty() {
            errors.sort_by_key(|(index, _)| *index);
            return Err(ValidationErrors {
                errors: errors.into_iter().map(|(_, e)| e).collect(),
            });
        }

        let components: Vec<Component> = slots.into_iter().flatten().collect();
        let report = Report::new(components, &policy);
        info!(
            "Validated {} components, success: {}",
            report.components.len(),
            report.success
        );
        Ok(report)
    }
}

async fn validate_component(
    validator: Arc<dyn ImageValidator>,
    limit: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    component: &SnapshotComponent,
    policy: &Policy,
    info: bool,
) -> anyhow::Result<Output> {
    let _permit = match limit {
        Some(limit) => tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ValidateError::Cancelled.into()),
            permit = limit.acquire_owned() => Some(permit?),
        },
        None => None,
    };

    debug!(
        "Validating image {} of component {}",
        component.container_image, component.name
    );
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ValidateError::Cancelled.into()),
        output = validator.validate(&component.container_image, policy, info) => output,
    }
}
