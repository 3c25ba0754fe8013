//! TOML-deserializable config shapes (spec §6.4, SPEC_FULL §4.0). Grounded
//! in the teacher's `config.rs`: plain `#[derive(Deserialize)]` structs with
//! `#[serde(default = "fn")]` for defaults that are constants, and a
//! hand-written `impl Default` only where the default needs computation.

use crate::network::NetworkConfig as RuntimeNetworkConfig;
use crate::protocols::ProtocolFamily;
use serde::Deserialize;
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

fn default_ident() -> String {
    "pylink".to_string()
}

fn default_autoconnect() -> i64 {
    10
}

fn default_ping_freq() -> u64 {
    RuntimeNetworkConfig::DEFAULT_PING_FREQ
}

fn default_ping_timeout() -> u64 {
    RuntimeNetworkConfig::DEFAULT_PING_TIMEOUT
}

fn default_outbound_queue_limit() -> usize {
    RuntimeNetworkConfig::DEFAULT_OUTBOUND_QUEUE_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_relay_db_path() -> String {
    "data/relay.db".to_string()
}

fn default_relay_save_interval() -> u64 {
    180
}

/// `server.log_format` (spec SPEC_FULL §4.0's ambient logging section):
/// plain human-readable vs `tracing_subscriber::fmt::json()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The PyLink instance's own name, used as the default service-bot
    /// server suffix and in log output.
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// PID file path; `None` with `pid_file_enabled = false` disables it
    /// (spec §6.4's "written on start by default").
    pub pid_file: Option<String>,
    #[serde(default = "default_true")]
    pub pid_file_enabled: bool,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One uplink network's config block, deserialized then converted to the
/// network driver's own [`RuntimeNetworkConfig`] by [`NetworkBlock::into_runtime_config`].
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkBlock {
    pub protocol: ProtocolFamily,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    pub cert_fingerprint: Option<String>,
    pub sendpass: Option<String>,
    pub recvpass: Option<String>,
    pub sid: String,
    #[serde(default)]
    pub description: String,
    pub nick: String,
    #[serde(default = "default_ident")]
    pub ident: String,
    #[serde(default)]
    pub realname: String,
    #[serde(default = "default_autoconnect")]
    pub autoconnect: i64,
    #[serde(default = "default_ping_freq")]
    pub ping_freq: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default = "default_outbound_queue_limit")]
    pub outbound_queue_limit: usize,
}

impl NetworkBlock {
    pub fn into_runtime_config(self, name: &str) -> RuntimeNetworkConfig {
        RuntimeNetworkConfig {
            name: name.to_string(),
            protocol: self.protocol,
            hostname: self.hostname,
            port: self.port,
            tls: self.tls,
            verify_cert: self.verify_cert,
            cert_fingerprint: self.cert_fingerprint,
            sendpass: self.sendpass,
            recvpass: self.recvpass,
            own_sid: self.sid,
            description: self.description,
            nick: self.nick,
            ident: self.ident,
            realname: self.realname,
            autoconnect: self.autoconnect,
            ping_freq: self.ping_freq,
            ping_timeout: self.ping_timeout,
            outbound_queue_limit: self.outbound_queue_limit,
        }
    }
}

/// `[relay]` config block (spec §4.7, §6.4's persistence knobs).
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_db_path")]
    pub db_path: String,
    #[serde(default = "default_relay_save_interval")]
    pub save_interval_secs: u64,
    /// Named pools of networks that share unmasked IPs for relayed puppets.
    #[serde(default)]
    pub ip_share_pools: HashMap<String, Vec<String>>,
    /// Named pools of networks where a real KILL (not a kick fallback) is
    /// permitted against a puppet of a user on another pool member.
    #[serde(default)]
    pub kill_share_pools: HashMap<String, Vec<String>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: default_relay_db_path(),
            save_interval_secs: default_relay_save_interval(),
            ip_share_pools: HashMap::new(),
            kill_share_pools: HashMap::new(),
        }
    }
}

/// `[permissions]` config block: the explicit entries layered over plugin
/// defaults (spec §4.6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionsConfig {
    #[serde(flatten)]
    pub grants: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub networks: HashMap<String, NetworkBlock>,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}
