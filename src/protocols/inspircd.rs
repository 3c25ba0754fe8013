//! InspIRCd adapter (spec §4.3's InspIRCd row).
//!
//! Shares its UUID allocation, burst, and SQUIT-cascade shape with
//! [`super::ts6::Ts6Adapter`] (both are CAPAB/TS-based, SID-addressed
//! protocols) but speaks a genuinely different wire vocabulary: `FJOIN`
//! instead of `SJOIN` with comma-separated `prefix,uuid` membership tokens
//! rather than glued `@uuid` ones, `FMODE`/`FTOPIC` instead of `TMODE`/`TB`,
//! and dedicated `FHOST`/`FIDENT`/`FNAME` commands where TS6 overloads ENCAP.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{join_modes, parse_modes, ModeClass, ParsedMode};
use crate::state::{descendant_sids, Capabilities, NetworkState, Server, User};
use crate::wire::RawMessage;
use parking_lot::Mutex;

const UUID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub struct InspircdAdapter {
    uuid_counter: Mutex<u64>,
}

impl InspircdAdapter {
    pub fn new() -> Self {
        Self { uuid_counter: Mutex::new(0) }
    }

    fn next_uuid(&self, own_sid: &str) -> String {
        let mut counter = self.uuid_counter.lock();
        let n = *counter;
        *counter += 1;
        let mut digits = [b'A'; 6];
        let mut v = n;
        for slot in digits.iter_mut().rev() {
            *slot = UUID_ALPHABET[(v % 36) as usize];
            v /= 36;
        }
        format!("{own_sid}{}", String::from_utf8_lossy(&digits))
    }
}

impl Default for InspircdAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ip(s: &str) -> Option<std::net::IpAddr> {
    if s == "0" || s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

fn user_snapshot(u: &User) -> UserSnapshot {
    UserSnapshot { uid: u.uid.clone(), nick: u.nick.clone(), ident: u.ident.clone(), host: u.host.clone(), channels: u.channels.iter().cloned().collect() }
}

impl ProtocolAdapter for InspircdAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_ts: true,
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
            "UID" => {
                // UID <uuid> <ts> <nick> <host> <dhost> <ident> <ip> <signon> +<modes> :<gecos>
                let (Some(uuid), Some(ts_str), Some(nick), Some(host), Some(dhost), Some(ident), Some(ip_str), Some(modes_tok), Some(gecos)) = (
                    line.arg(0), line.arg(1), line.arg(2), line.arg(3), line.arg(4), line.arg(5), line.arg(6), line.arg(8), line.args.last(),
                ) else {
                    return Ok(());
                };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let mut user = User::new(uuid, nick, source.clone(), ts);
                user.ident = ident.to_string();
                user.realhost = host.to_string();
                user.cloaked_host = dhost.to_string();
                user.host = dhost.to_string();
                user.ip = parse_ip(ip_str);
                user.realname = gecos.clone();
                user.modes = modes_tok.trim_start_matches('+').chars().collect();
                user.opered = user.modes.contains(&'o');
                state.users.insert(user);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts,
                    payload: HookPayload::Uid {
                        uid: uuid.to_string(),
                        nick: nick.to_string(),
                        realhost: host.to_string(),
                        host: dhost.to_string(),
                        ident: ident.to_string(),
                        ip: parse_ip(ip_str).map(|ip| ip.to_string()),
                        secure: None,
                    },
                });
            }
            "FJOIN" => {
                // FJOIN <chan> <ts> <modes> [modeparams...] :<prefix,uuid ...>
                let (Some(ts_str), Some(chan_name)) = (line.arg(1), line.arg(0)) else { return Ok(()) };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let arg_count = line.args.len();
                if arg_count < 4 {
                    return Ok(());
                }
                let user_list = line.arg(arg_count - 1).unwrap_or("");
                let mode_tokens: Vec<&str> = line.args[2..arg_count - 1].iter().map(String::as_str).collect();
                let parsed_modes = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));

                let table = state.mode_table.clone();
                let mut joined_uids = Vec::new();
                for tok in user_list.split_whitespace() {
                    let (prefix_str, uuid) = tok.split_once(',').unwrap_or(("", tok));
                    let prefix_modes: Vec<ParsedMode> = prefix_str
                        .chars()
                        .filter_map(|c| state.mode_table.mode_for_symbol(c))
                        .map(|(ch, _)| ParsedMode::new(true, ch, Some(uuid.to_string())))
                        .collect();
                    let chan = state.channel_or_create(chan_name);
                    chan.members.insert(uuid.to_string());
                    chan.apply_modes(&table, &prefix_modes);
                    joined_uids.push(uuid.to_string());
                }
                let chan = state.channel_or_create(chan_name);
                chan.update_ts(&table, ts, &parsed_modes);

                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts,
                    payload: HookPayload::Join { channel: chan_name.to_string(), users: joined_uids, modes: parsed_modes },
                });
            }
            "FMODE" => {
                // FMODE <target> <ts> <modes> [args...]
                let (Some(target), Some(ts_str)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let mode_tokens: Vec<&str> = line.args[2..].iter().map(String::as_str).collect();
                let parsed = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));
                let table = state.mode_table.clone();
                let before = state.channel_or_create(target).clone();
                let chan = state.channel_or_create(target);
                chan.apply_modes(&table, &parsed);
                let channeldata = Some(crate::hooks::ChannelSnapshot { name: before.name, ts: before.ts, modes: parsed.clone() });
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts,
                    payload: HookPayload::Mode { target: target.to_string(), modes: parsed, channeldata },
                });
            }
            "MODE" => {
                // MODE <uuid> <modes> [args...] (user's own modes, no TS)
                let Some(target) = line.arg(0) else { return Ok(()) };
                let mode_tokens: Vec<&str> = line.args[1..].iter().map(String::as_str).collect();
                let parsed = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));
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
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Mode { target: target.to_string(), modes: parsed, channeldata: None },
                });
            }
            "FTOPIC" => {
                // FTOPIC <chan> <ts> <setter> :<topic>
                let (Some(channel), Some(setter)) = (line.arg(0), line.arg(2)) else { return Ok(()) };
                let text = line.args.last().cloned().unwrap_or_default();
                let oldtopic = state.channel(channel).ok().and_then(|c| c.topic.clone());
                if let Ok(chan) = state.channel_mut(channel) {
                    chan.topic = Some(text.clone());
                    chan.topic_set = true;
                    chan.topic_setter = Some(setter.to_string());
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Topic { channel: channel.to_string(), setter: setter.to_string(), text, oldtopic },
                });
            }
            "FHOST" => {
                let Some(newhost) = line.arg(0) else { return Ok(()) };
                if let Some(user) = state.users.get_mut(&source) {
                    user.host = newhost.to_string();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Chghost { target: source, newhost: newhost.to_string() },
                });
            }
            "FIDENT" => {
                let Some(newident) = line.arg(0) else { return Ok(()) };
                if let Some(user) = state.users.get_mut(&source) {
                    user.ident = newident.to_string();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Chgident { target: source, newident: newident.to_string() },
                });
            }
            "FNAME" => {
                let Some(newgecos) = line.args.last() else { return Ok(()) };
                if let Some(user) = state.users.get_mut(&source) {
                    user.realname = newgecos.clone();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Chgname { target: source, newgecos: newgecos.clone() },
                });
            }
            "OPERTYPE" => {
                let opertype = line.arg(0).unwrap_or("IRCop").to_string();
                if let Some(user) = state.users.get_mut(&source) {
                    user.opered = true;
                    user.opertype = Some(opertype.clone());
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::ClientOpered { text: opertype },
                });
            }
            "SVSNICK" => {
                let (Some(target), Some(newnick)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                let ts = line.arg(2).and_then(|s| s.parse().ok()).unwrap_or_else(now_ts);
                state.users.rename(target, newnick, ts)?;
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts,
                    payload: HookPayload::Svsnick { target: target.to_string(), newnick: newnick.to_string() },
                });
            }
            "NICK" => {
                let Some(newnick) = line.arg(0) else { return Ok(()) };
                let ts = line.arg(1).and_then(|s| s.parse().ok()).unwrap_or_else(now_ts);
                let oldnick = state.users.get(&source).map(|u| u.nick.clone()).unwrap_or_default();
                state.users.rename(&source, newnick, ts)?;
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
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
            "KILL" => {
                let Some(target) = line.arg(0) else { return Ok(()) };
                let text = line.args.last().cloned().unwrap_or_default();
                let userdata = state.users.get(target).map(user_snapshot);
                state.users.remove(target);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Kill { target: target.to_string(), text, userdata },
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
                // SERVER <name> <pass> <hops> <sid> :<desc>
                let (Some(name), Some(sid), Some(desc)) = (line.arg(0), line.arg(3), line.args.last()) else { return Ok(()) };
                state.servers.insert(
                    sid.to_string(),
                    Server {
                        sid: sid.to_string(),
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
                let Some(target_sid) = line.arg(0) else { return Ok(()) };
                let descendants = descendant_sids(&state.servers, target_sid);
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
                        target: target_sid.to_string(),
                        users: all_users,
                        name: target_sid.to_string(),
                        uplink: Some(source),
                        nicks,
                        affected_servers: descendants,
                    },
                });
            }
            "BURST" => {}
            "ENDBURST" => {
                if let Some(srv) = state.servers.get_mut(&source) {
                    srv.has_eob = true;
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Endburst,
                });
            }
            "PING" | "PONG" => {}
            _ => {}
        }
        Ok(())
    }

    fn spawn_client(&self, state: &mut NetworkState, p: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)> {
        let uuid = self.next_uuid(&state.own_sid);
        let modes_str = format!("+{}", p.modes.iter().map(|m| m.ch).collect::<String>());
        let mut user = User::new(uuid.as_str(), p.nick, p.server, p.ts);
        user.ident = p.ident.to_string();
        user.host = p.host.to_string();
        user.realhost = p.realhost.to_string();
        user.cloaked_host = p.host.to_string();
        user.ip = p.ip.and_then(|s| s.parse().ok());
        user.realname = p.realname.to_string();
        user.modes = p.modes.iter().map(|m| m.ch).collect();
        user.opertype = p.opertype.map(String::from);
        user.opered = p.opertype.is_some();
        user.manipulatable = p.manipulatable;
        state.users.insert(user);
        let line = RawMessage::new(
            Some(p.server),
            "UID",
            vec![
                uuid.clone(),
                p.ts.to_string(),
                p.nick.to_string(),
                p.host.to_string(),
                p.host.to_string(),
                p.ident.to_string(),
                p.ip.unwrap_or("0").to_string(),
                p.ts.to_string(),
                modes_str,
                p.realname.to_string(),
            ],
        );
        Ok((uuid, vec![line]))
    }

    fn spawn_server(
        &self,
        state: &mut NetworkState,
        name: &str,
        sid: Option<&str>,
        uplink: Option<&str>,
        description: Option<&str>,
    ) -> Result<(String, Vec<RawMessage>)> {
        let sid = sid.map(String::from).ok_or_else(|| PylinkError::InvalidArgument("sid required for InspIRCd SERVER".into()))?;
        let uplink = uplink.unwrap_or(&state.own_sid).to_string();
        state.servers.insert(
            sid.clone(),
            Server {
                sid: sid.clone(),
                name: name.to_string(),
                description: description.unwrap_or_default().to_string(),
                uplink_sid: Some(uplink.clone()),
                children: Default::default(),
                users: Default::default(),
                has_eob: false,
            },
        );
        let line = RawMessage::new(
            Some(uplink),
            "SERVER",
            vec![name.to_string(), "*".to_string(), "1".to_string(), sid.clone(), description.unwrap_or("PyLink").to_string()],
        );
        Ok((sid, vec![line]))
    }

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>> {
        let ts = state.channel_or_create(channel).ts;
        state.channel_or_create(channel).members.insert(uid.to_string());
        Ok(vec![RawMessage::new(Some(uid), "FJOIN", vec![channel.to_string(), ts.to_string(), "+".to_string(), format!(",{uid}")])])
    }

    fn sjoin(
        &self,
        state: &mut NetworkState,
        sid: &str,
        channel: &str,
        users: &[(String, String)],
        ts: i64,
        modes: &[ParsedMode],
    ) -> Result<Vec<RawMessage>> {
        let table = state.mode_table.clone();
        let chan = state.channel_or_create(channel);
        for (_, uid) in users {
            chan.members.insert(uid.clone());
        }
        chan.apply_modes(&table, modes);
        chan.update_ts(&table, ts, modes);

        let non_prefix: Vec<ParsedMode> = modes
            .iter()
            .filter(|m| !matches!(state.mode_table.chan_class(m.ch), Some(ModeClass::Prefix(_))))
            .cloned()
            .collect();
        let mode_str = join_modes(&non_prefix, &state.mode_table, true);
        let user_tokens: Vec<String> = users.iter().map(|(prefix, uid)| format!("{prefix},{uid}")).collect();
        let mut args = vec![channel.to_string(), ts.to_string()];
        if mode_str.is_empty() {
            args.push("+".to_string());
        } else {
            args.extend(mode_str);
        }
        args.push(user_tokens.join(" "));
        Ok(vec![RawMessage::new(Some(sid), "FJOIN", args)])
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
        ts: Option<i64>,
    ) -> Result<Vec<RawMessage>> {
        let table = state.mode_table.clone();
        let mode_str = if target.starts_with('#') {
            let chan = state.channel_mut(target)?;
            chan.apply_modes(&table, parsed);
            join_modes(parsed, &table, true)
        } else {
            join_modes(parsed, &table, false)
        };
        let command = if target.starts_with('#') { "FMODE" } else { "MODE" };
        let mut args = vec![target.to_string()];
        if target.starts_with('#') {
            args.push(ts.unwrap_or_else(now_ts).to_string());
        }
        args.extend(mode_str);
        Ok(vec![RawMessage::new(Some(src), command, args)])
    }

    fn nick(&self, state: &mut NetworkState, uid: &str, newnick: &str) -> Result<Vec<RawMessage>> {
        let ts = now_ts();
        state.users.rename(uid, newnick, ts)?;
        Ok(vec![RawMessage::new(Some(uid), "NICK", vec![newnick.to_string(), ts.to_string()])])
    }

    fn update_client(&self, src: &str, uid: &str, field: UpdatableField, value: &str) -> Result<Vec<RawMessage>> {
        match field {
            UpdatableField::Host | UpdatableField::Realhost => Ok(vec![RawMessage::new(Some(uid), "FHOST", vec![value.to_string()])]),
            UpdatableField::Ident => Ok(vec![RawMessage::new(Some(uid), "FIDENT", vec![value.to_string()])]),
            UpdatableField::Gecos => Ok(vec![RawMessage::new(Some(uid), "FNAME", vec![value.to_string()])]),
            UpdatableField::ServicesAccount => {
                Ok(vec![RawMessage::new(Some(src), "METADATA", vec![uid.to_string(), "accountname".to_string(), value.to_string()])])
            }
            UpdatableField::Away => Err(PylinkError::NotSupported("InspIRCd AWAY is client-originated only")),
        }
    }

    fn send_burst(&self, state: &NetworkState) -> Vec<RawMessage> {
        let mut out = Vec::new();
        out.push(RawMessage::new(Some(state.own_sid.clone()), "BURST", vec![]));
        for user in state.users.iter() {
            let modes_str = format!("+{}", user.modes.iter().collect::<String>());
            out.push(RawMessage::new(
                Some(user.server_sid.clone()),
                "UID",
                vec![
                    user.uid.clone(),
                    user.signon_ts.to_string(),
                    user.nick.clone(),
                    user.realhost.clone(),
                    user.host.clone(),
                    user.ident.clone(),
                    user.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "0".to_string()),
                    user.signon_ts.to_string(),
                    modes_str,
                    user.realname.clone(),
                ],
            ));
        }
        for chan in state.channels_iter() {
            let member_tokens: Vec<String> = chan.members.iter().map(|m| format!(",{m}")).collect();
            out.push(RawMessage::new(Some(state.own_sid.clone()), "FJOIN", vec![chan.name.clone(), chan.ts.to_string(), "+".to_string(), member_tokens.join(" ")]));
        }
        out.push(RawMessage::new(Some(state.own_sid.clone()), "ENDBURST", vec![]));
        out
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "CAPAB", vec!["START".to_string(), "1203".to_string()]),
            RawMessage::new(None::<&str>, "CAPAB", vec!["END".to_string()]),
            RawMessage::new(
                None::<&str>,
                "SERVER",
                vec![params.own_name.to_string(), params.sendpass.unwrap_or("").to_string(), "0".to_string(), params.own_sid.to_string(), params.description.to_string()],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeTable;

    fn net() -> NetworkState {
        let mut n = NetworkState::new("InspNet", "1AA", InspircdAdapter::new().capabilities());
        n.mode_table = ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+");
        n
    }

    #[test]
    fn spawn_client_allocates_sequential_uuids() {
        let adapter = InspircdAdapter::new();
        let mut state = net();
        let (uid1, _) = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Alice", ident: "alice", host: "host", realhost: "host", modes: &[],
                server: "1AA", ip: None, realname: "Alice", ts: 1_700_000_000, opertype: None, manipulatable: false,
            })
            .unwrap();
        assert!(uid1.starts_with("1AA"));
        assert!(state.users.contains(&uid1));
    }

    #[test]
    fn inbound_fjoin_parses_comma_separated_prefix_tokens() {
        let adapter = InspircdAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        let line = RawMessage::parse(":1AA FJOIN #test 1700000000 +nt :@,1AAAAAAAA ,1AAAAAAAB").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        let chan = state.channel("#test").unwrap();
        assert!(chan.members.contains("1AAAAAAAA"));
        assert!(chan.members.contains("1AAAAAAAB"));
        assert!(chan.ranks_of("1AAAAAAAA").contains(&crate::modes::PrefixRank::Op));
        assert!(chan.ranks_of("1AAAAAAAB").is_empty());
    }

    #[test]
    fn svsnick_renames_target() {
        let adapter = InspircdAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        state.users.insert(User::new("1AAAAAAAA", "Baduser", "1AA", 1_700_000_000));
        let line = RawMessage::parse(":1AA SVSNICK 1AAAAAAAA Guest12345 1700000001").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        assert_eq!(state.users.get("1AAAAAAAA").unwrap().nick, "Guest12345");
    }

    #[test]
    fn opertype_marks_user_opered() {
        let adapter = InspircdAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        state.users.insert(User::new("1AAAAAAAA", "Oper", "1AA", 1_700_000_000));
        let line = RawMessage::parse(":1AAAAAAAA OPERTYPE NetAdmin").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        let user = state.users.get("1AAAAAAAA").unwrap();
        assert!(user.opered);
        assert_eq!(user.opertype.as_deref(), Some("NetAdmin"));
    }
}
