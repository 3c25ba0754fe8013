//! Configuration loading, validation, and REHASH diffing (spec §6.4, §6.5).
//! Grounded in the teacher's `config.rs`/`config/validation.rs` split:
//! `Config::load` only parses, `validate()` is a separate pass, and both
//! use the teacher's stack (`serde` + `toml` + `thiserror`).

pub mod types;
pub mod validation;

pub use types::{Config, LogFormat, NetworkBlock, PermissionsConfig, RelayConfig, ServerConfig};
pub use validation::{validate, ValidationError};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// What changed between two loaded configs, used to drive REHASH's
/// in-place reconciliation (spec §5: "disconnected networks whose config
/// was removed are destroyed; everything else is reloaded without
/// dropping ready connections").
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RehashDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Present in both, but with a different config block (hostname, port,
    /// sid, ...) — callers only apply these to a network that isn't
    /// currently `Ready`, per spec §5.
    pub changed: Vec<String>,
}

impl Config {
    pub fn diff_networks(&self, previous: &Config) -> RehashDiff {
        let mut diff = RehashDiff::default();
        for name in self.networks.keys() {
            if !previous.networks.contains_key(name) {
                diff.added.push(name.clone());
            }
        }
        for name in previous.networks.keys() {
            if !self.networks.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }
        for (name, block) in &self.networks {
            if let Some(prev_block) = previous.networks.get(name) {
                if !network_block_eq(block, prev_block) {
                    diff.changed.push(name.clone());
                }
            }
        }
        diff
    }
}

fn network_block_eq(a: &NetworkBlock, b: &NetworkBlock) -> bool {
    a.protocol == b.protocol
        && a.hostname == b.hostname
        && a.port == b.port
        && a.tls == b.tls
        && a.sid == b.sid
        && a.nick == b.nick
        && a.sendpass == b.sendpass
        && a.recvpass == b.recvpass
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("valid toml")
    }

    #[test]
    fn diff_detects_added_removed_and_changed_networks() {
        let before = parse(
            r#"
            [server]
            name = "pylink.example"

            [networks.one]
            protocol = "ts6"
            hostname = "irc.one.example"
            port = 7000
            sid = "1AA"
            nick = "PyLink"

            [networks.two]
            protocol = "ts6"
            hostname = "irc.two.example"
            port = 7000
            sid = "1AB"
            nick = "PyLink"
        "#,
        );
        let after = parse(
            r#"
            [server]
            name = "pylink.example"

            [networks.one]
            protocol = "ts6"
            hostname = "irc.one-new.example"
            port = 7000
            sid = "1AA"
            nick = "PyLink"

            [networks.three]
            protocol = "ts6"
            hostname = "irc.three.example"
            port = 7000
            sid = "1AC"
            nick = "PyLink"
        "#,
        );
        let diff = after.diff_networks(&before);
        assert_eq!(diff.added, vec!["three".to_string()]);
        assert_eq!(diff.removed, vec!["two".to_string()]);
        assert_eq!(diff.changed, vec!["one".to_string()]);
    }
}
