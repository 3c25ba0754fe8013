//! ngIRCd adapter (spec §4.3's ngIRCd row: "TS-less").
//!
//! ngIRCd's server protocol predates TS6-style timestamp reconciliation: it
//! has no per-network SID/UID scheme, so clients and servers are addressed
//! by nick and server name directly, and there is no TS to reconcile on
//! SJOIN-equivalent bursts — the adapter just applies whatever the remote
//! side says, last write wins. `capabilities().has_ts` is `false` and the
//! TS argument on generic operations is accepted but ignored.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{join_modes, parse_modes, ParsedMode};
use crate::state::{descendant_sids, Capabilities, NetworkState, Server, User};
use crate::wire::RawMessage;

pub struct NgircdAdapter;

impl NgircdAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NgircdAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn user_snapshot(u: &User) -> UserSnapshot {
    UserSnapshot { uid: u.uid.clone(), nick: u.nick.clone(), ident: u.ident.clone(), host: u.host.clone(), channels: u.channels.iter().cloned().collect() }
}

impl ProtocolAdapter for NgircdAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_ts: false,
            can_manage_bot_channels: true,
            has_irc_modes: true,
            freeform_nicks: false,
            virtual_server: true,
            visible_state_only: false,
            mode_bounce_needs_server: false,
            has_kill: true,
        }
    }

    fn handle_line(&self, state: &mut NetworkState, bus: &HookBus, line: &RawMessage) -> Result<()> {
        let source = line.prefix.clone().unwrap_or_else(|| state.own_sid.clone());
        match line.command.as_str() {
            "NICK" => {
                // Introduction: NICK <nick> <hopcount> <user> <host> <modes> :<gecos>
                // Change (already known nick as prefix): NICK <newnick>
                if line.args.len() >= 5 {
                    let (Some(nick), Some(ident), Some(host), Some(umodes), Some(gecos)) = (
                        line.arg(0), line.arg(2), line.arg(3), line.arg(4), line.args.last(),
                    ) else {
                        return Ok(());
                    };
                    let ts = now_ts();
                    let mut user = User::new(nick, nick, source.clone(), ts);
                    user.ident = ident.to_string();
                    user.host = host.to_string();
                    user.realhost = host.to_string();
                    user.cloaked_host = host.to_string();
                    user.realname = gecos.clone();
                    user.modes = umodes.trim_start_matches('+').chars().collect();
                    user.opered = user.modes.contains(&'o');
                    state.users.insert(user);
                    bus.dispatch(&mut HookEvent {
                        network: state.network_name.clone(),
                        source: source.clone(),
                        ts,
                        payload: HookPayload::Uid {
                            uid: nick.to_string(),
                            nick: nick.to_string(),
                            realhost: host.to_string(),
                            host: host.to_string(),
                            ident: ident.to_string(),
                            ip: None,
                            secure: None,
                        },
                    });
                } else {
                    let Some(newnick) = line.arg(0) else { return Ok(()) };
                    let oldnick = state.users.get(&source).map(|u| u.nick.clone()).unwrap_or_default();
                    state.users.rename(&source, newnick, now_ts())?;
                    bus.dispatch(&mut HookEvent {
                        network: state.network_name.clone(),
                        source: source.clone(),
                        ts: now_ts(),
                        payload: HookPayload::Nick { newnick: newnick.to_string(), oldnick },
                    });
                }
            }
            "JOIN" => {
                let Some(channel) = line.arg(0) else { return Ok(()) };
                state.channel_or_create(channel).members.insert(source.clone());
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Join { channel: channel.to_string(), users: vec![source], modes: vec![] },
                });
            }
            "MODE" => {
                let Some(target) = line.arg(0) else { return Ok(()) };
                let mode_tokens: Vec<&str> = line.args[1..].iter().map(String::as_str).collect();
                let parsed = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));
                let channeldata = if target.starts_with('#') {
                    let table = state.mode_table.clone();
                    let before = state.channel_or_create(target).clone();
                    let chan = state.channel_or_create(target);
                    chan.apply_modes(&table, &parsed);
                    Some(crate::hooks::ChannelSnapshot { name: before.name, ts: before.ts, modes: parsed.clone() })
                } else {
                    if let Some(user) = state.users.get_mut(target) {
                        for m in &parsed {
                            if m.plus {
                                user.modes.insert(m.ch);
                            } else {
                                user.modes.remove(&m.ch);
                            }
                        }
                        user.opered = user.modes.contains(&'o');
                    }
                    None
                };
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
            "KICK" => {
                let (Some(channel), Some(target)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                let text = line.arg(2).map(String::from);
                if let Ok(chan) = state.channel_mut(channel) {
                    chan.members.remove(target);
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Kick { channel: channel.to_string(), target: target.to_string(), text },
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
            "SERVER" => {
                let (Some(name), Some(desc)) = (line.arg(0), line.args.last()) else { return Ok(()) };
                state.servers.insert(
                    name.to_string(),
                    Server {
                        sid: name.to_string(),
                        name: name.to_string(),
                        description: desc.clone(),
                        uplink_sid: Some(source),
                        children: Default::default(),
                        users: Default::default(),
                        has_eob: false,
                    },
                );
            }
            "SQUIT" => {
                let Some(target_name) = line.arg(0) else { return Ok(()) };
                let descendants = descendant_sids(&state.servers, target_name);
                let mut all_users = Vec::new();
                let mut nicks: std::collections::HashMap<String, Vec<String>> = Default::default();
                let channel_membership: Vec<(String, std::collections::HashSet<String>)> =
                    state.channels_iter().map(|c| (c.name.clone(), c.members.clone())).collect();
                for sid in &descendants {
                    if let Some(srv) = state.servers.remove(sid) {
                        for uid in srv.users {
                            if let Some(u) = state.users.get(&uid) {
                                all_users.push(uid.clone());
                                for (cname, members) in &channel_membership {
                                    if members.contains(&uid) {
                                        nicks.entry(cname.clone()).or_default().push(u.nick.clone());
                                    }
                                }
                            }
                            state.users.remove(&uid);
                        }
                    }
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Squit {
                        target: target_name.to_string(),
                        users: all_users,
                        name: target_name.to_string(),
                        uplink: Some(source),
                        nicks,
                        affected_servers: descendants,
                    },
                });
            }
            "PING" | "PONG" => {}
            _ => {}
        }
        Ok(())
    }

    fn spawn_client(&self, state: &mut NetworkState, p: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)> {
        // ngIRCd has no UID scheme; the nick itself is the network-scoped
        // identifier, so collisions here must be avoided by the caller
        // (Relay reserves/renames as needed before calling this).
        let uid = p.nick.to_string();
        let modes_str = format!("+{}", p.modes.iter().map(|m| m.ch).collect::<String>());
        let mut user = User::new(uid.as_str(), p.nick, p.server, p.ts);
        user.ident = p.ident.to_string();
        user.host = p.host.to_string();
        user.realhost = p.realhost.to_string();
        user.cloaked_host = p.host.to_string();
        user.realname = p.realname.to_string();
        user.modes = p.modes.iter().map(|m| m.ch).collect();
        user.opertype = p.opertype.map(String::from);
        user.opered = p.opertype.is_some();
        user.manipulatable = p.manipulatable;
        state.users.insert(user);
        let line = RawMessage::new(
            Some(p.server),
            "NICK",
            vec![p.nick.to_string(), "1".to_string(), p.ident.to_string(), p.host.to_string(), modes_str, p.realname.to_string()],
        );
        Ok((uid, vec![line]))
    }

    fn spawn_server(
        &self,
        state: &mut NetworkState,
        name: &str,
        sid: Option<&str>,
        uplink: Option<&str>,
        description: Option<&str>,
    ) -> Result<(String, Vec<RawMessage>)> {
        let uplink = uplink.unwrap_or(&state.own_sid).to_string();
        state.servers.insert(
            name.to_string(),
            Server {
                sid: sid.map(String::from).unwrap_or_else(|| name.to_string()),
                name: name.to_string(),
                description: description.unwrap_or_default().to_string(),
                uplink_sid: Some(uplink.clone()),
                children: Default::default(),
                users: Default::default(),
                has_eob: false,
            },
        );
        let line = RawMessage::new(Some(uplink), "SERVER", vec![name.to_string(), description.unwrap_or("PyLink").to_string()]);
        Ok((name.to_string(), vec![line]))
    }

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>> {
        state.channel_or_create(channel).members.insert(uid.to_string());
        Ok(vec![RawMessage::new(Some(uid), "JOIN", vec![channel.to_string()])])
    }

    fn sjoin(
        &self,
        state: &mut NetworkState,
        sid: &str,
        channel: &str,
        users: &[(String, String)],
        _ts: i64,
        modes: &[ParsedMode],
    ) -> Result<Vec<RawMessage>> {
        // No burst batching primitive; emit one JOIN per user plus a single
        // MODE line for the channel's non-prefix modes.
        let table = state.mode_table.clone();
        let chan = state.channel_or_create(channel);
        for (_, uid) in users {
            chan.members.insert(uid.clone());
        }
        chan.apply_modes(&table, modes);
        let mut out: Vec<RawMessage> = users.iter().map(|(_, uid)| RawMessage::new(Some(uid.clone()), "JOIN", vec![channel.to_string()])).collect();
        let mode_str = join_modes(modes, &table, true);
        if !mode_str.is_empty() {
            let mut args = vec![channel.to_string()];
            args.extend(mode_str);
            out.push(RawMessage::new(Some(sid), "MODE", args));
        }
        Ok(out)
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
        Ok(vec![RawMessage::new(Some(uid), "PART", args)])
    }

    fn quit(&self, state: &mut NetworkState, uid: &str, reason: &str) -> Result<Vec<RawMessage>> {
        state.users.remove(uid);
        Ok(vec![RawMessage::new(Some(uid), "QUIT", vec![reason.to_string()])])
    }

    fn mode(
        &self,
        state: &mut NetworkState,
        src: &str,
        target: &str,
        parsed: &[ParsedMode],
        _ts: Option<i64>,
    ) -> Result<Vec<RawMessage>> {
        let table = state.mode_table.clone();
        let mode_str = if target.starts_with('#') {
            let chan = state.channel_mut(target)?;
            chan.apply_modes(&table, parsed);
            join_modes(parsed, &table, true)
        } else {
            join_modes(parsed, &table, false)
        };
        let mut args = vec![target.to_string()];
        args.extend(mode_str);
        Ok(vec![RawMessage::new(Some(src), "MODE", args)])
    }

    fn nick(&self, state: &mut NetworkState, uid: &str, newnick: &str) -> Result<Vec<RawMessage>> {
        state.users.rename(uid, newnick, now_ts())?;
        Ok(vec![RawMessage::new(Some(uid), "NICK", vec![newnick.to_string()])])
    }

    fn update_client(&self, _src: &str, _uid: &str, field: UpdatableField, _value: &str) -> Result<Vec<RawMessage>> {
        Err(match field {
            UpdatableField::Away => PylinkError::NotSupported("ngIRCd AWAY is client-originated only"),
            _ => PylinkError::NotSupported("ngIRCd has no live field-update command"),
        })
    }

    fn send_burst(&self, state: &NetworkState) -> Vec<RawMessage> {
        let mut out = Vec::new();
        for user in state.users.iter() {
            let modes_str = format!("+{}", user.modes.iter().collect::<String>());
            out.push(RawMessage::new(
                Some(user.server_sid.clone()),
                "NICK",
                vec![user.nick.clone(), "1".to_string(), user.ident.clone(), user.host.clone(), modes_str, user.realname.clone()],
            ));
        }
        for chan in state.channels_iter() {
            for member in &chan.members {
                out.push(RawMessage::new(Some(member.clone()), "JOIN", vec![chan.name.clone()]));
            }
        }
        out
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "PASS", vec![params.sendpass.unwrap_or("").to_string(), "0210-IRC+".to_string(), "ngIRCd|pylink:CLHS".to_string(), "P".to_string()]),
            RawMessage::new(None::<&str>, "SERVER", vec![params.own_name.to_string(), "1".to_string(), params.description.to_string()]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> NetworkState {
        NetworkState::new("NgNet", "irc.example.org", NgircdAdapter::new().capabilities())
    }

    #[test]
    fn spawn_client_uses_nick_as_identifier() {
        let adapter = NgircdAdapter::new();
        let mut state = net();
        let (uid, _) = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Alice", ident: "alice", host: "host", realhost: "host", modes: &[],
                server: "irc.example.org", ip: None, realname: "Alice", ts: 1_700_000_000, opertype: None, manipulatable: false,
            })
            .unwrap();
        assert_eq!(uid, "Alice");
        assert!(state.users.contains("Alice"));
    }

    #[test]
    fn has_ts_capability_is_false() {
        let adapter = NgircdAdapter::new();
        assert!(!adapter.capabilities().has_ts);
    }

    #[test]
    fn update_client_not_supported() {
        let adapter = NgircdAdapter::new();
        let err = adapter.update_client("irc.example.org", "Alice", UpdatableField::Host, "new.host").unwrap_err();
        assert!(matches!(err, PylinkError::NotSupported(_)));
    }
}
