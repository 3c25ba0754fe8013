//! `NetworkState`: per-uplink authoritative state (spec §3).

use super::channel::Channel;
use super::mapping::UserMapping;
use super::server::Server;
use crate::casemap::{case_fold, Casemap};
use crate::error::{PylinkError, Result};
use crate::modes::ModeTable;
use std::collections::HashMap;

/// Capability set a protocol adapter declares (spec §4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub has_ts: bool,
    pub can_manage_bot_channels: bool,
    pub has_irc_modes: bool,
    pub freeform_nicks: bool,
    pub virtual_server: bool,
    pub visible_state_only: bool,
    pub mode_bounce_needs_server: bool,
    /// Whether this protocol has a real S2S KILL; Relay falls back to
    /// kick-and-rejoin against puppets on protocols without one.
    pub has_kill: bool,
}

/// ISUPPORT-derived tokens relevant to state handling.
#[derive(Debug, Clone, Default)]
pub struct IsupportTokens {
    pub casemapping: Casemap,
    pub chanmodes: String,
    pub prefix: String,
    pub nicklen: usize,
    pub chanlen: usize,
    pub statusmsg: String,
}

pub struct NetworkState {
    pub network_name: String,
    pub own_sid: String,
    pub capabilities: Capabilities,
    pub uplink_sid: Option<String>,
    pub users: UserMapping,
    pub servers: HashMap<String, Server>,
    channels: HashMap<String, Channel>,
    pub isupport: IsupportTokens,
    pub mode_table: ModeTable,
    pub disconnected: bool,
}

impl NetworkState {
    pub fn new(network_name: impl Into<String>, own_sid: impl Into<String>, capabilities: Capabilities) -> Self {
        let isupport = IsupportTokens::default();
        Self {
            network_name: network_name.into(),
            own_sid: own_sid.into(),
            capabilities,
            uplink_sid: None,
            users: UserMapping::new(isupport.casemapping),
            servers: HashMap::new(),
            channels: HashMap::new(),
            isupport,
            mode_table: ModeTable::default(),
            disconnected: false,
        }
    }

    fn fold(&self, name: &str) -> String {
        case_fold(name, self.isupport.casemapping)
    }

    /// Read/create access used by protocol adapters (spec §4.2:
    /// "default-materializing map... returns an empty Channel whose name
    /// is the key").
    pub fn channel_or_create(&mut self, name: &str) -> &mut Channel {
        let key = self.fold(name);
        self.channels
            .entry(key)
            .or_insert_with(|| Channel::new(name, MIN_TS_PLACEHOLDER))
    }

    /// Strict access used by plugins (spec §4.2: "missing channel fails
    /// with NotFound").
    pub fn channel(&self, name: &str) -> Result<&Channel> {
        self.channels
            .get(&self.fold(name))
            .ok_or_else(|| PylinkError::NotFound(format!("channel {name}")))
    }

    pub fn channel_mut(&mut self, name: &str) -> Result<&mut Channel> {
        let key = self.fold(name);
        self.channels
            .get_mut(&key)
            .ok_or_else(|| PylinkError::NotFound(format!("channel {name}")))
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(&self.fold(name))
    }

    /// Destroy a channel once its member set empties (spec §3 lifecycle),
    /// unless `persistent` pins it (service-bot dynamic channels, §4.5).
    pub fn remove_channel_if_empty(&mut self, name: &str, persistent: bool) {
        let key = self.fold(name);
        let empty = self.channels.get(&key).is_some_and(|c| c.members.is_empty());
        if empty && !persistent {
            self.channels.remove(&key);
        }
    }

    pub fn channels_iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Placeholder used only until a real TS is supplied by the first JOIN/SJOIN
/// that actually materializes the channel via [`NetworkState::channel_or_create`]
/// followed immediately by `update_ts`. Deliberately higher than any real
/// creation TS so that first contact always takes the "adopt theirs" branch
/// of [`super::channel::Channel::update_ts`] rather than discarding it.
const MIN_TS_PLACEHOLDER: i64 = i64::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_or_create_materializes_lazily() {
        let mut net = NetworkState::new("TestNet", "1AA", Capabilities::default());
        assert!(!net.has_channel("#test"));
        net.channel_or_create("#test");
        assert!(net.has_channel("#test"));
    }

    #[test]
    fn strict_channel_access_fails_not_found() {
        let net = NetworkState::new("TestNet", "1AA", Capabilities::default());
        assert!(net.channel("#missing").is_err());
    }

    #[test]
    fn empty_channel_removed_unless_persistent() {
        let mut net = NetworkState::new("TestNet", "1AA", Capabilities::default());
        net.channel_or_create("#test");
        net.remove_channel_if_empty("#test", false);
        assert!(!net.has_channel("#test"));

        net.channel_or_create("#persist");
        net.remove_channel_if_empty("#persist", true);
        assert!(net.has_channel("#persist"));
    }
}
