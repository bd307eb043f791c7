// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

/// Environment variable naming the root of `gate-rs` work dirs.
pub const GATE_WORK_DIR: &str = "GATE_WORK_DIR";

pub mod output;
pub mod policy;
pub mod report;
pub mod rule;
pub mod snapshot;
pub mod source;
pub mod validate;
pub mod work_dir;
