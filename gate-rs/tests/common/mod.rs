// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gate_rs::output::{Output, RuleResult};
use gate_rs::policy::{Policy, PolicyOptions};
use gate_rs::rule::RuleMetadata;
use gate_rs::snapshot::SnapshotComponent;
use gate_rs::validate::ImageValidator;

/// What the mock validator does for one image.
#[derive(Clone, Debug)]
pub enum Behavior {
    Pass,
    Violate(&'static str),
    Fail(&'static str),
    Hang,
}

/// An [`ImageValidator`] scripted per image, counting its calls.
#[derive(Default)]
pub struct MockValidator {
    behaviors: HashMap<String, (Behavior, Duration)>,
    calls: Mutex<HashMap<String, usize>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockValidator {
    pub fn with(mut self, image: &str, behavior: Behavior, delay_ms: u64) -> Self {
        self.behaviors.insert(
            image.to_string(),
            (behavior, Duration::from_millis(delay_ms)),
        );
        self
    }

    pub fn calls(&self, image: &str) -> usize {
        self.calls.lock().unwrap().get(image).copied().unwrap_or(0)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageValidator for MockValidator {
    async fn validate(&self, image: &str, _policy: &Policy, info: bool) -> anyhow::Result<Output> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(image.to_string())
            .or_default() += 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        let (behavior, delay) = self
            .behaviors
            .get(image)
            .cloned()
            .unwrap_or((Behavior::Pass, Duration::ZERO));
        tokio::time::sleep(delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match behavior {
            Behavior::Pass => Ok(Output {
                image_url: format!("{image}@sha256:0123"),
                ..Default::default()
            }),
            Behavior::Violate(code) => {
                let rule = RuleMetadata {
                    code: code.to_string(),
                    title: "A rule".to_string(),
                    ..Default::default()
                };
                Ok(Output {
                    image_url: format!("{image}@sha256:0123"),
                    violations: vec![RuleResult::from_rule("violated", &rule, info)],
                    ..Default::default()
                })
            }
            Behavior::Fail(msg) => Err(anyhow::anyhow!(msg)),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn components(images: &[&str]) -> Vec<SnapshotComponent> {
    images
        .iter()
        .enumerate()
        .map(|(i, image)| SnapshotComponent {
            name: format!("component-{i}"),
            container_image: image.to_string(),
        })
        .collect()
}

pub fn policy() -> Policy {
    Policy::new("publicKey: cosign.pub", PolicyOptions::default()).unwrap()
}
