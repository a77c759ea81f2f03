//! Common test utilities for workbook integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't read the
//! user's real config directory.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated workbook root.
///
/// Each `TestEnv` creates two temporary directories:
/// - `root_dir`: the workbook root the commands run in
/// - `config_dir`: stands in for the user config directory (via `WB_CONFIG_HOME`)
///
/// The `wb()` method returns a `Command` that sets the environment
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub root_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            root_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and initialize a workbook.
    pub fn init() -> Self {
        let env = Self::new();
        env.wb().arg("init").assert().success();
        env
    }

    /// Get a Command for the wb binary running in the workbook root.
    pub fn wb(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_wb"));
        cmd.current_dir(self.root_dir.path());
        cmd.env("WB_CONFIG_HOME", self.config_dir.path());
        cmd.env_remove("WB_ROOT");
        cmd.env_remove("WB_OUTPUT");
        cmd.env_remove("WB_LOG");
        cmd
    }

    /// Run a command that must succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.wb().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// Get the path to the workbook root.
    pub fn path(&self) -> &std::path::Path {
        self.root_dir.path()
    }

    /// Read the Master Index of a collection ("tasks" or "bugs").
    pub fn index(&self, collection: &str) -> String {
        std::fs::read_to_string(self.path().join(collection).join("INDEX.md")).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
