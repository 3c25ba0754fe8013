//! Spawns a `pylinkd` child process against a config file on disk, killing
//! it on drop. Grounded in the teacher's `tests/common/server.rs`, minus the
//! TLS asset generation this crate's tests don't need.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Child, Command};

pub struct TestServer {
    child: Child,
}

impl TestServer {
    /// Spawn `pylinkd --config <config_path> --no-check-pid` and leave it
    /// running; the caller drives it over whatever TCP listeners its config
    /// points at.
    pub fn spawn(config_path: &Path) -> std::io::Result<Self> {
        let child = Command::new(env!("CARGO_BIN_EXE_pylinkd"))
            .arg("--config")
            .arg(config_path)
            .arg("--no-check-pid")
            .spawn()?;
        Ok(Self { child })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
