// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Scoped work directories. All policy sources of a run are fetched below
//! one [`WorkDir`]; the whole tree is removed when it is dropped.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::GATE_WORK_DIR;

const WORK_DIR_PREFIX: &str = "gate-";

#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a work dir under `$GATE_WORK_DIR`, or under the system temp
    /// dir when it is not set.
    pub fn create() -> std::io::Result<Self> {
        let root = std::env::var_os(GATE_WORK_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::create_in(root)
    }

    /// Create a work dir under `root`, creating `root` if needed.
    pub fn create_in(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(root)?;
        debug!("Created work dir {}", dir.path().display());

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the work dir now, reporting failures instead of ignoring them.
    pub fn close(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().inspect_err(|e| {
            warn!("Failed to remove work dir {}: {e}", path.display());
        })
    }
}

impl AsRef<Path> for WorkDir {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}
