// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use clap::Subcommand;
use thiserror::Error;

pub mod inspect;
pub mod validate;

/// The run was cancelled by a signal before it completed.
#[derive(Error, Debug)]
#[error("interrupted")]
pub struct Interrupted;

#[derive(Subcommand)]
pub enum Operation {
    /// Validate conformance of container images with a policy
    #[command(subcommand)]
    Validate(validate::ValidateTarget),

    /// Inspect policy sources
    #[command(subcommand)]
    Inspect(inspect::InspectTarget),
}
