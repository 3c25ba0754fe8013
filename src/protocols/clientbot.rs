//! Clientbot adapter (spec §4.3's Clientbot row).
//!
//! Unlike the other five, Clientbot never links as a server: it connects as
//! one ordinary IRC client, so it can only ever originate itself, not
//! puppets. Every operation that would require server-link privilege
//! (`spawn_client`, `spawn_server`, `sjoin`, `kill`, `squit`, field updates)
//! raises [`PylinkError::NotSupported`] — Relay degrades these calls rather
//! than aborting. `capabilities().virtual_server` is `false` and
//! `visible_state_only` is `true`: the adapter only knows about channels the
//! bot itself has joined and the nicks NAMES/JOIN/PART told it about, not a
//! server-wide user table. Unknown numerics are logged rather than silently
//! dropped, for diagnosing an IRCd the bot hasn't been taught yet.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{parse_modes, ParsedMode};
use crate::state::{Capabilities, NetworkState, User};
use crate::wire::RawMessage;
use tracing::warn;

pub struct ClientbotAdapter;

impl ClientbotAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClientbotAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn nick_from_prefix(prefix: &str) -> &str {
    prefix.split(['!', '@']).next().unwrap_or(prefix)
}

fn user_snapshot(u: &User) -> UserSnapshot {
    UserSnapshot { uid: u.uid.clone(), nick: u.nick.clone(), ident: u.ident.clone(), host: u.host.clone(), channels: u.channels.iter().cloned().collect() }
}

impl ProtocolAdapter for ClientbotAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_ts: false,
            can_manage_bot_channels: false,
            has_irc_modes: true,
            freeform_nicks: false,
            virtual_server: false,
            visible_state_only: true,
            mode_bounce_needs_server: false,
            has_kill: false,
        }
    }

    fn handle_line(&self, state: &mut NetworkState, bus: &HookBus, line: &RawMessage) -> Result<()> {
        let prefix = line.prefix.clone().unwrap_or_default();
        let source = nick_from_prefix(&prefix).to_string();
        match line.command.as_str() {
            "JOIN" => {
                let Some(channel) = line.arg(0) else { return Ok(()) };
                if !state.users.contains(&source) {
                    state.users.insert(User::new(source.clone(), source.clone(), state.own_sid.clone(), now_ts()));
                }
                state.channel_or_create(channel).members.insert(source.clone());
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Join { channel: channel.to_string(), users: vec![source], modes: vec![] },
                });
            }
            "PART" => {
                let Some(channel) = line.arg(0) else { return Ok(()) };
                if let Ok(chan) = state.channel_mut(channel) {
                    chan.members.remove(&source);
                }
                state.remove_channel_if_empty(channel, false);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Part { channels: vec![channel.to_string()], text: line.arg(1).map(String::from) },
                });
            }
            "KICK" => {
                let (Some(channel), Some(target)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                if let Ok(chan) = state.channel_mut(channel) {
                    chan.members.remove(target);
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Kick { channel: channel.to_string(), target: target.to_string(), text: line.arg(2).map(String::from) },
                });
            }
            "NICK" => {
                let Some(newnick) = line.arg(0) else { return Ok(()) };
                let oldnick = source.clone();
                if state.users.contains(&source) {
                    state.users.rename(&source, newnick, now_ts())?;
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Nick { newnick: newnick.to_string(), oldnick },
                });
            }
            "QUIT" => {
                let text = line.args.last().cloned().unwrap_or_default();
                let userdata = state.users.get(&source).map(user_snapshot);
                state.users.remove(&source);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Quit { text, userdata },
                });
            }
            "MODE" => {
                let Some(target) = line.arg(0) else { return Ok(()) };
                let mode_tokens: Vec<&str> = line.args[1..].iter().map(String::as_str).collect();
                let parsed = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));
                let table = state.mode_table.clone();
                let channeldata = target.starts_with('#').then(|| {
                    let chan = state.channel_or_create(target);
                    chan.apply_modes(&table, &parsed);
                    crate::hooks::ChannelSnapshot { name: chan.name.clone(), ts: chan.ts, modes: parsed.clone() }
                });
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Mode { target: target.to_string(), modes: parsed, channeldata },
                });
            }
            "TOPIC" => {
                let channel = line.arg(0).unwrap_or_default().to_string();
                let text = line.args.last().cloned().unwrap_or_default();
                let oldtopic = state.channel(&channel).ok().and_then(|c| c.topic.clone());
                if let Ok(chan) = state.channel_mut(&channel) {
                    chan.topic = Some(text.clone());
                    chan.topic_set = true;
                    chan.topic_setter = Some(source.clone());
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Topic { channel, setter: source, text, oldtopic },
                });
            }
            "PRIVMSG" => {
                let (Some(target), Some(text)) = (line.arg(0), line.args.last()) else { return Ok(()) };
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Privmsg { target: target.to_string(), text: text.clone() },
                });
            }
            "NOTICE" => {
                let (Some(target), Some(text)) = (line.arg(0), line.args.last()) else { return Ok(()) };
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Notice { target: target.to_string(), text: text.clone() },
                });
            }
            "PING" => {}
            "001" => {
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::PylinkNewService { name: state.network_name.clone() },
                });
            }
            cmd if cmd.chars().all(|c| c.is_ascii_digit()) => {
                warn!(network = %state.network_name, numeric = cmd, args = ?line.args, "unhandled Clientbot numeric");
            }
            _ => {}
        }
        Ok(())
    }

    fn spawn_client(&self, _state: &mut NetworkState, _params: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)> {
        Err(PylinkError::NotSupported("Clientbot cannot spawn puppet clients (not a server link)"))
    }

    fn spawn_server(
        &self,
        _state: &mut NetworkState,
        _name: &str,
        _sid: Option<&str>,
        _uplink: Option<&str>,
        _description: Option<&str>,
    ) -> Result<(String, Vec<RawMessage>)> {
        Err(PylinkError::NotSupported("Clientbot cannot introduce servers (not a server link)"))
    }

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>> {
        state.channel_or_create(channel).members.insert(uid.to_string());
        Ok(vec![RawMessage::new(None::<&str>, "JOIN", vec![channel.to_string()])])
    }

    fn sjoin(
        &self,
        _state: &mut NetworkState,
        _sid: &str,
        _channel: &str,
        _users: &[(String, String)],
        _ts: i64,
        _modes: &[ParsedMode],
    ) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("Clientbot has no burst-join primitive"))
    }

    fn part(&self, state: &mut NetworkState, uid: &str, channel: &str, reason: Option<&str>) -> Result<Vec<RawMessage>> {
        if let Ok(chan) = state.channel_mut(channel) {
            chan.members.remove(uid);
        }
        state.remove_channel_if_empty(channel, false);
        let mut args = vec![channel.to_string()];
        if let Some(r) = reason {
            args.push(r.to_string());
        }
        Ok(vec![RawMessage::new(None::<&str>, "PART", args)])
    }

    fn quit(&self, _state: &mut NetworkState, _uid: &str, _reason: &str) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("Clientbot cannot quit other users (not a server link)"))
    }

    fn kill(&self, _src: &str, _target: &str, _reason: &str) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("Clientbot has no KILL privilege"))
    }

    fn mode(
        &self,
        state: &mut NetworkState,
        _src: &str,
        target: &str,
        parsed: &[ParsedMode],
        _ts: Option<i64>,
    ) -> Result<Vec<RawMessage>> {
        use crate::modes::join_modes;
        let table = state.mode_table.clone();
        if target.starts_with('#') {
            let chan = state.channel_mut(target)?;
            chan.apply_modes(&table, parsed);
        }
        let mode_str = join_modes(parsed, &table, false);
        let mut args = vec![target.to_string()];
        args.extend(mode_str);
        Ok(vec![RawMessage::new(None::<&str>, "MODE", args)])
    }

    fn nick(&self, _state: &mut NetworkState, _uid: &str, _newnick: &str) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("Clientbot cannot rename other users (not a server link)"))
    }

    fn update_client(&self, _src: &str, _uid: &str, _field: UpdatableField, _value: &str) -> Result<Vec<RawMessage>> {
        Err(PylinkError::NotSupported("Clientbot cannot change remote client attributes"))
    }

    fn squit(&self, _sid: &str, _target_sid: &str, _reason: &str) -> Vec<RawMessage> {
        Vec::new()
    }

    fn send_burst(&self, _state: &NetworkState) -> Vec<RawMessage> {
        Vec::new()
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "NICK", vec![params.nick.to_string()]),
            RawMessage::new(None::<&str>, "USER", vec![params.ident.to_string(), "0".to_string(), "*".to_string(), params.realname.to_string()]),
        ]
    }

    /// Clientbot has no burst to end; it considers itself synced once the
    /// server sends end-of-MOTD (376) or no-MOTD (422).
    fn is_end_of_burst(&self, line: &RawMessage) -> bool {
        matches!(line.command.as_str(), "376" | "422")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> NetworkState {
        NetworkState::new("ClientbotNet", "clientbot", ClientbotAdapter::new().capabilities())
    }

    #[test]
    fn spawn_client_is_not_supported() {
        let adapter = ClientbotAdapter::new();
        let mut state = net();
        let err = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Puppet", ident: "p", host: "h", realhost: "h", modes: &[],
                server: "clientbot", ip: None, realname: "Puppet", ts: 1, opertype: None, manipulatable: false,
            })
            .unwrap_err();
        assert!(matches!(err, PylinkError::NotSupported(_)));
    }

    #[test]
    fn inbound_join_materializes_sender_as_a_user() {
        let adapter = ClientbotAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        let line = RawMessage::parse(":alice!a@host JOIN #test").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        assert!(state.users.contains("alice"));
        assert!(state.channel("#test").unwrap().members.contains("alice"));
    }

    #[test]
    fn capabilities_reflect_single_client_connection() {
        let caps = ClientbotAdapter::new().capabilities();
        assert!(!caps.virtual_server);
        assert!(caps.visible_state_only);
    }
}
