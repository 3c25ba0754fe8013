//! Per-IRCd-family protocol state machines (spec §4.3, §6.1).
//!
//! Each adapter turns inbound S2S lines into [`crate::hooks::HookEvent`]s
//! dispatched on a [`HookBus`], mutates the network's [`NetworkState`] as the
//! authoritative side effect, and turns outbound operation calls into
//! [`RawMessage`] frames for the network driver to queue and send. The
//! adapters share nothing but this trait and the generic `modes`/`wire`/
//! `state` building blocks — TS6, InspIRCd, UnrealIRCd, P10, ngIRCd, and
//! Clientbot each speak a genuinely different wire format.

pub mod clientbot;
pub mod inspircd;
pub mod ngircd;
pub mod p10;
pub mod ts6;
pub mod unreal;

use crate::error::{PylinkError, Result};
use crate::hooks::HookBus;
use crate::modes::ParsedMode;
use crate::state::{Capabilities, NetworkState};
use crate::wire::RawMessage;

/// Selects which [`ProtocolAdapter`] a network's config block instantiates
/// (spec §4.3's per-IRCd-family table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Ts6,
    Inspircd,
    P10,
    Unreal,
    Ngircd,
    Clientbot,
}

impl ProtocolFamily {
    pub fn build(self) -> Box<dyn ProtocolAdapter> {
        match self {
            Self::Ts6 => Box::new(ts6::Ts6Adapter::new()),
            Self::Inspircd => Box::new(inspircd::InspircdAdapter::new()),
            Self::P10 => Box::new(p10::P10Adapter::new()),
            Self::Unreal => Box::new(unreal::UnrealAdapter::new()),
            Self::Ngircd => Box::new(ngircd::NgircdAdapter::new()),
            Self::Clientbot => Box::new(clientbot::ClientbotAdapter::new()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ts6 => "ts6",
            Self::Inspircd => "inspircd",
            Self::P10 => "p10",
            Self::Unreal => "unreal",
            Self::Ngircd => "ngircd",
            Self::Clientbot => "clientbot",
        }
    }
}

/// Fields `update_client` can change on a live remote user (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatableField {
    Ident,
    Host,
    Realhost,
    Gecos,
    Away,
    ServicesAccount,
}

/// Our own identity and configured credentials, used to build the
/// connecting side's registration preamble (spec §5's Connecting→
/// Registering transition).
pub struct RegisterParams<'a> {
    pub own_sid: &'a str,
    pub own_name: &'a str,
    pub description: &'a str,
    pub sendpass: Option<&'a str>,
    pub nick: &'a str,
    pub ident: &'a str,
    pub realname: &'a str,
}

/// Parameters for [`ProtocolAdapter::spawn_client`] (spec §6.1).
pub struct SpawnClient<'a> {
    pub nick: &'a str,
    pub ident: &'a str,
    pub host: &'a str,
    pub realhost: &'a str,
    pub modes: &'a [ParsedMode],
    pub server: &'a str,
    pub ip: Option<&'a str>,
    pub realname: &'a str,
    pub ts: i64,
    pub opertype: Option<&'a str>,
    pub manipulatable: bool,
}

/// A protocol adapter: wire-format-specific inbound parsing/dispatch and
/// outbound operation framing for one IRCd family or Clientbot (spec §4.3).
pub trait ProtocolAdapter: Send + Sync {
    /// The capability set this protocol declares (spec §4.3's table).
    fn capabilities(&self) -> Capabilities;

    /// Parse and apply one inbound S2S line: mutate `state` and dispatch
    /// zero or more hook events on `bus`. Unknown commands are ignored
    /// silently (Clientbot overrides this to log them for diagnosis).
    fn handle_line(&self, state: &mut NetworkState, bus: &HookBus, line: &RawMessage) -> Result<()>;

    fn spawn_client(&self, state: &mut NetworkState, params: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)>;

    fn spawn_server(
        &self,
        state: &mut NetworkState,
        name: &str,
        sid: Option<&str>,
        uplink: Option<&str>,
        description: Option<&str>,
    ) -> Result<(String, Vec<RawMessage>)>;

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>>;

    fn sjoin(
        &self,
        state: &mut NetworkState,
        sid: &str,
        channel: &str,
        users: &[(String, String)],
        ts: i64,
        modes: &[ParsedMode],
    ) -> Result<Vec<RawMessage>>;

    fn part(&self, state: &mut NetworkState, uid: &str, channel: &str, reason: Option<&str>) -> Result<Vec<RawMessage>>;

    fn quit(&self, state: &mut NetworkState, uid: &str, reason: &str) -> Result<Vec<RawMessage>>;

    fn kick(&self, src: &str, channel: &str, target: &str, reason: Option<&str>) -> Result<Vec<RawMessage>> {
        let mut args = vec![channel.to_string(), target.to_string()];
        if let Some(r) = reason {
            args.push(r.to_string());
        }
        Ok(vec![RawMessage::new(Some(src), "KICK", args)])
    }

    /// Raises [`PylinkError::NotSupported`] on protocols without S2S kill.
    fn kill(&self, src: &str, target: &str, reason: &str) -> Result<Vec<RawMessage>> {
        Ok(vec![RawMessage::new(Some(src), "KILL", vec![target.to_string(), reason.to_string()])])
    }

    fn mode(
        &self,
        state: &mut NetworkState,
        src: &str,
        target: &str,
        parsed: &[ParsedMode],
        ts: Option<i64>,
    ) -> Result<Vec<RawMessage>>;

    fn nick(&self, state: &mut NetworkState, uid: &str, newnick: &str) -> Result<Vec<RawMessage>> {
        state.users.rename(uid, newnick, crate::hooks::now_ts())?;
        Ok(vec![RawMessage::new(Some(uid), "NICK", vec![newnick.to_string()])])
    }

    /// Raises [`PylinkError::NotSupported`] when the protocol has no wire
    /// command for this field (e.g. REALHOST on protocols that never
    /// reveal it, spec §6.1).
    fn update_client(&self, src: &str, uid: &str, field: UpdatableField, value: &str) -> Result<Vec<RawMessage>>;

    fn message(&self, src: &str, target: &str, text: &str) -> Vec<RawMessage> {
        vec![RawMessage::new(Some(src), "PRIVMSG", vec![target.to_string(), text.to_string()])]
    }

    fn notice(&self, src: &str, target: &str, text: &str) -> Vec<RawMessage> {
        vec![RawMessage::new(Some(src), "NOTICE", vec![target.to_string(), text.to_string()])]
    }

    fn numeric(&self, src_sid: &str, numeric: &str, target: &str, text: &str) -> Vec<RawMessage> {
        vec![RawMessage::new(Some(src_sid), numeric, vec![target.to_string(), text.to_string()])]
    }

    fn topic(&self, state: &mut NetworkState, uid: &str, channel: &str, text: &str) -> Result<Vec<RawMessage>> {
        let chan = state.channel_mut(channel)?;
        chan.topic = Some(text.to_string());
        chan.topic_set = true;
        chan.topic_setter = Some(uid.to_string());
        Ok(vec![RawMessage::new(Some(uid), "TOPIC", vec![channel.to_string(), text.to_string()])])
    }

    fn topic_burst(&self, state: &mut NetworkState, sid: &str, channel: &str, text: &str) -> Result<Vec<RawMessage>> {
        let chan = state.channel_mut(channel)?;
        chan.topic = Some(text.to_string());
        chan.topic_set = true;
        Ok(vec![RawMessage::new(Some(sid), "TB", vec![channel.to_string(), text.to_string()])])
    }

    fn invite(&self, src: &str, target: &str, channel: &str) -> Vec<RawMessage> {
        vec![RawMessage::new(Some(src), "INVITE", vec![target.to_string(), channel.to_string()])]
    }

    fn knock(&self, _src: &str, _channel: &str, _text: &str) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("KNOCK"))
    }

    fn squit(&self, sid: &str, target_sid: &str, reason: &str) -> Vec<RawMessage> {
        vec![RawMessage::new(Some(sid), "SQUIT", vec![target_sid.to_string(), reason.to_string()])]
    }

    fn ping(&self, src: &str, target: Option<&str>) -> Vec<RawMessage> {
        let mut args = vec![src.to_string()];
        if let Some(t) = target {
            args.push(t.to_string());
        }
        vec![RawMessage::new(None::<&str>, "PING", args)]
    }

    fn pong(&self, own_sid: &str, target: Option<&str>) -> Vec<RawMessage> {
        let mut args = vec![own_sid.to_string()];
        if let Some(t) = target {
            args.push(t.to_string());
        }
        vec![RawMessage::new(Some(own_sid), "PONG", args)]
    }

    /// Constant-time-ish comparison of what the peer offered in its PASS
    /// against our configured recvpass.
    fn check_recvpass(&self, offered: &str, configured: &str) -> bool {
        offered == configured
    }

    fn cap_negotiate(&self) -> Vec<RawMessage> {
        Vec::new()
    }

    /// Emit this side's full burst (own SID, users, channels) after the
    /// handshake completes (spec §4.3 Bursting state).
    fn send_burst(&self, state: &NetworkState) -> Vec<RawMessage>;

    /// Lines sent immediately on connect, before any reply from the peer
    /// (PASS/CAPAB/SERVER for server-link protocols, NICK/USER for
    /// Clientbot) — the Connecting→Registering transition of spec §5.
    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage>;

    /// Whether `line` marks the end of the peer's burst, transitioning
    /// Bursting→Ready (spec §5). Checked by the network driver in addition
    /// to normal `handle_line` dispatch, since ENDBURST-equivalents carry
    /// no hook-worthy state change of their own on some protocols.
    fn is_end_of_burst(&self, line: &RawMessage) -> bool {
        matches!(line.command.as_str(), "ENDBURST" | "EOS" | "EB" | "EA" | "EOB" | "PONG")
    }
}
