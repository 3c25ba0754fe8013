//! Config validation, separate from deserialization (spec §6.4). Grounded
//! in the teacher's `config/validation.rs`: a standalone `validate()`
//! function (not a `Config` method) that collects every problem into a
//! `Vec` instead of stopping at the first one, so a misconfigured instance
//! reports everything wrong in one pass.

use super::types::Config;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyServerName,
    #[error("network {0:?} has an empty sid")]
    EmptyNetworkSid(String),
    #[error("network {0:?} has an empty hostname")]
    EmptyNetworkHostname(String),
    #[error("two networks ({0:?} and {1:?}) share sid {2:?}")]
    DuplicateSid(String, String, String),
    #[error("relay.ip_share_pools entry {0:?} references unknown network {1:?}")]
    UnknownIpSharePoolMember(String, String),
    #[error("relay.kill_share_pools entry {0:?} references unknown network {1:?}")]
    UnknownKillSharePoolMember(String, String),
    #[error("permissions entry {0:?} grants no permission globs")]
    EmptyPermissionGrant(String),
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServerName);
    }

    let mut seen_sids: Vec<(String, String)> = Vec::new();
    for (name, net) in &config.networks {
        if net.sid.trim().is_empty() {
            errors.push(ValidationError::EmptyNetworkSid(name.clone()));
        } else if let Some((other, _)) = seen_sids.iter().find(|(_, sid)| sid == &net.sid) {
            errors.push(ValidationError::DuplicateSid(other.clone(), name.clone(), net.sid.clone()));
        } else {
            seen_sids.push((name.clone(), net.sid.clone()));
        }
        if net.hostname.trim().is_empty() {
            errors.push(ValidationError::EmptyNetworkHostname(name.clone()));
        }
    }

    for (pool, members) in &config.relay.ip_share_pools {
        for member in members {
            if !config.networks.contains_key(member) {
                errors.push(ValidationError::UnknownIpSharePoolMember(pool.clone(), member.clone()));
            }
        }
    }
    for (pool, members) in &config.relay.kill_share_pools {
        for member in members {
            if !config.networks.contains_key(member) {
                errors.push(ValidationError::UnknownKillSharePoolMember(pool.clone(), member.clone()));
            }
        }
    }

    for (mask, globs) in &config.permissions.grants {
        if globs.is_empty() {
            errors.push(ValidationError::EmptyPermissionGrant(mask.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("valid toml")
    }

    #[test]
    fn rejects_empty_server_name() {
        let config = parse(
            r#"
            [server]
            name = ""
        "#,
        );
        let errors = validate(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyServerName));
    }

    #[test]
    fn rejects_duplicate_sid() {
        let config = parse(
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
            sid = "1AA"
            nick = "PyLink"
        "#,
        );
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateSid(..))));
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = parse(
            r#"
            [server]
            name = "pylink.example"

            [networks.one]
            protocol = "ts6"
            hostname = "irc.one.example"
            port = 7000
            sid = "1AA"
            nick = "PyLink"
        "#,
        );
        assert!(validate(&config).is_ok());
    }
}
