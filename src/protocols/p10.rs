//! P10/Nefarious adapter (spec §4.3's P10 row).
//!
//! P10 addresses servers and clients by short base64-like numerics rather
//! than SID/UID strings, and abbreviates most commands to one- or two-letter
//! tokens (`N` nick/introduction, `B` burst join, `J` plain join, `M` mode,
//! `T` topic, `P`/`O` privmsg/notice, `G`/`Z` ping/pong, `EB`/`EA` end of
//! burst). TS reconciliation and hook dispatch reuse the same shape as
//! [`super::ts6::Ts6Adapter`]; only the wire tokens and numeric addressing
//! scheme differ.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{join_modes, parse_modes, ModeClass, ParsedMode};
use crate::state::{descendant_sids, Capabilities, NetworkState, Server, User};
use crate::wire::RawMessage;
use parking_lot::Mutex;

const NUMERIC_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789[]";

pub struct P10Adapter {
    client_counter: Mutex<u64>,
}

impl P10Adapter {
    pub fn new() -> Self {
        Self { client_counter: Mutex::new(0) }
    }

    /// Own server numeric + 3-char base64-ish client numeric, matching
    /// P10's fixed 5-character numnick shape.
    fn next_numeric(&self, own_sid: &str) -> String {
        let mut counter = self.client_counter.lock();
        let n = *counter;
        *counter += 1;
        let mut digits = [b'A'; 3];
        let mut v = n;
        for slot in digits.iter_mut().rev() {
            *slot = NUMERIC_ALPHABET[(v % 64) as usize];
            v /= 64;
        }
        format!("{own_sid}{}", String::from_utf8_lossy(&digits))
    }
}

impl Default for P10Adapter {
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

impl ProtocolAdapter for P10Adapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_ts: true,
            can_manage_bot_channels: true,
            has_irc_modes: true,
            freeform_nicks: false,
            virtual_server: true,
            visible_state_only: false,
            mode_bounce_needs_server: true,
            has_kill: true,
        }
    }

    fn handle_line(&self, state: &mut NetworkState, bus: &HookBus, line: &RawMessage) -> Result<()> {
        let source = line.prefix.clone().unwrap_or_else(|| state.own_sid.clone());
        match line.command.as_str() {
            "N" => {
                // A trailing numnick arg marks introduction; without one, this
                // is a plain nick change handled by the NICK case below.
                if line.args.len() < 8 {
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
                    return Ok(());
                }
                // N <nick> <hops> <ts> <ident> <host> <modes> <ip> <numeric> :<gecos>
                let (Some(nick), Some(ts_str), Some(ident), Some(host), Some(umodes), Some(ip_str), Some(numeric), Some(gecos)) = (
                    line.arg(0), line.arg(2), line.arg(3), line.arg(4), line.arg(5), line.arg(6), line.arg(7), line.args.last(),
                ) else {
                    return Ok(());
                };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let mut user = User::new(numeric, nick, source.clone(), ts);
                user.ident = ident.to_string();
                user.host = host.to_string();
                user.realhost = host.to_string();
                user.cloaked_host = host.to_string();
                user.ip = parse_ip(ip_str);
                user.realname = gecos.clone();
                user.modes = umodes.trim_start_matches('+').chars().collect();
                user.opered = user.modes.contains(&'o');
                state.users.insert(user);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts,
                    payload: HookPayload::Uid {
                        uid: numeric.to_string(),
                        nick: nick.to_string(),
                        realhost: host.to_string(),
                        host: host.to_string(),
                        ident: ident.to_string(),
                        ip: parse_ip(ip_str).map(|ip| ip.to_string()),
                        secure: None,
                    },
                });
            }
            "B" => {
                // B <chan> <ts> [+modes [args...]] :<numeric[:modeflags],...>
                let (Some(chan_name), Some(ts_str)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let arg_count = line.args.len();
                if arg_count < 3 {
                    return Ok(());
                }
                let user_list = line.arg(arg_count - 1).unwrap_or("");
                let mode_tokens: Vec<&str> = line.args[2..arg_count - 1].iter().map(String::as_str).collect();
                let parsed_modes = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));

                let table = state.mode_table.clone();
                let mut joined_uids = Vec::new();
                let mut current_ranks: Vec<ParsedMode> = Vec::new();
                for tok in user_list.split(',') {
                    let (numeric, flags) = tok.split_once(':').unwrap_or((tok, ""));
                    if !flags.is_empty() {
                        current_ranks = flags
                            .chars()
                            .filter_map(|c| state.mode_table.mode_for_symbol(c).or_else(|| (c == 'o').then(|| ('o', crate::modes::PrefixRank::Op))))
                            .map(|(ch, _)| ParsedMode::new(true, ch, None))
                            .collect();
                    }
                    let chan = state.channel_or_create(chan_name);
                    chan.members.insert(numeric.to_string());
                    let with_target: Vec<ParsedMode> = current_ranks.iter().map(|m| ParsedMode::new(true, m.ch, Some(numeric.to_string()))).collect();
                    chan.apply_modes(&table, &with_target);
                    joined_uids.push(numeric.to_string());
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
            "J" => {
                let Some(chan_name) = line.arg(0) else { return Ok(()) };
                let chan = state.channel_or_create(chan_name);
                chan.members.insert(source.clone());
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts: now_ts(),
                    payload: HookPayload::Join { channel: chan_name.to_string(), users: vec![source], modes: vec![] },
                });
            }
            "M" => {
                // M <target> <modes> [args...]
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
            "T" => {
                // T <chan> <chants> <ts> :<topic>
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
            "Q" => {
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
            "K" => {
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
            "P" => {
                let (Some(target), Some(text)) = (line.arg(0), line.args.last()) else { return Ok(()) };
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Privmsg { target: target.to_string(), text: text.clone() },
                });
            }
            "O" => {
                let (Some(target), Some(text)) = (line.arg(0), line.args.last()) else { return Ok(()) };
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Notice { target: target.to_string(), text: text.clone() },
                });
            }
            "SERVER" => {
                // SERVER <name> <hops> <start-ts> <link-ts> J10 <numeric> +<flags> :<desc>
                let (Some(name), Some(numeric), Some(desc)) = (line.arg(0), line.arg(5), line.args.last()) else { return Ok(()) };
                state.servers.insert(
                    numeric.to_string(),
                    Server {
                        sid: numeric.to_string(),
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
            "EB" => {
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
            "EA" => {}
            "G" | "Z" => {}
            _ => {}
        }
        Ok(())
    }

    fn spawn_client(&self, state: &mut NetworkState, p: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)> {
        let numeric = self.next_numeric(&state.own_sid);
        let modes_str = format!("+{}", p.modes.iter().map(|m| m.ch).collect::<String>());
        let mut user = User::new(numeric.as_str(), p.nick, p.server, p.ts);
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
            "N",
            vec![
                p.nick.to_string(),
                "1".to_string(),
                p.ts.to_string(),
                p.ident.to_string(),
                p.host.to_string(),
                modes_str,
                p.ip.unwrap_or("0").to_string(),
                numeric.clone(),
                p.realname.to_string(),
            ],
        );
        Ok((numeric, vec![line]))
    }

    fn spawn_server(
        &self,
        state: &mut NetworkState,
        name: &str,
        sid: Option<&str>,
        uplink: Option<&str>,
        description: Option<&str>,
    ) -> Result<(String, Vec<RawMessage>)> {
        let numeric = sid.map(String::from).ok_or_else(|| PylinkError::InvalidArgument("numeric required for P10 SERVER".into()))?;
        let uplink = uplink.unwrap_or(&state.own_sid).to_string();
        state.servers.insert(
            numeric.clone(),
            Server {
                sid: numeric.clone(),
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
            vec![
                name.to_string(),
                "1".to_string(),
                now_ts().to_string(),
                now_ts().to_string(),
                "J10".to_string(),
                numeric.clone(),
                "+s".to_string(),
                description.unwrap_or("PyLink").to_string(),
            ],
        );
        Ok((numeric, vec![line]))
    }

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>> {
        state.channel_or_create(channel).members.insert(uid.to_string());
        Ok(vec![RawMessage::new(Some(uid), "J", vec![channel.to_string()])])
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
        let user_tokens: Vec<String> = users
            .iter()
            .map(|(prefix, uid)| if prefix.is_empty() { uid.clone() } else { format!("{uid}:{prefix}") })
            .collect();
        let mut args = vec![channel.to_string(), ts.to_string()];
        args.extend(mode_str);
        args.push(user_tokens.join(","));
        Ok(vec![RawMessage::new(Some(sid), "B", args)])
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
        Ok(vec![RawMessage::new(Some(uid), "Q", vec![reason.to_string()])])
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
        Ok(vec![RawMessage::new(Some(src), "M", args)])
    }

    fn nick(&self, state: &mut NetworkState, uid: &str, newnick: &str) -> Result<Vec<RawMessage>> {
        let ts = now_ts();
        state.users.rename(uid, newnick, ts)?;
        Ok(vec![RawMessage::new(Some(uid), "N", vec![newnick.to_string(), ts.to_string()])])
    }

    fn kill(&self, src: &str, target: &str, reason: &str) -> Result<Vec<RawMessage>> {
        Ok(vec![RawMessage::new(Some(src), "K", vec![target.to_string(), reason.to_string()])])
    }

    fn update_client(&self, _src: &str, _uid: &str, field: UpdatableField, _value: &str) -> Result<Vec<RawMessage>> {
        match field {
            UpdatableField::Ident | UpdatableField::Host | UpdatableField::Realhost | UpdatableField::Gecos | UpdatableField::ServicesAccount => {
                Err(PylinkError::NotSupported("P10 has no live field-update command; these require a fresh introduction"))
            }
            UpdatableField::Away => Err(PylinkError::NotSupported("P10 AWAY is client-originated only")),
        }
    }

    fn send_burst(&self, state: &NetworkState) -> Vec<RawMessage> {
        let mut out = Vec::new();
        for user in state.users.iter() {
            let modes_str = format!("+{}", user.modes.iter().collect::<String>());
            out.push(RawMessage::new(
                Some(user.server_sid.clone()),
                "N",
                vec![
                    user.nick.clone(),
                    "1".to_string(),
                    user.signon_ts.to_string(),
                    user.ident.clone(),
                    user.host.clone(),
                    modes_str,
                    user.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "0".to_string()),
                    user.uid.clone(),
                    user.realname.clone(),
                ],
            ));
        }
        for chan in state.channels_iter() {
            let member_tokens: Vec<String> = chan.members.iter().cloned().collect();
            out.push(RawMessage::new(Some(state.own_sid.clone()), "B", vec![chan.name.clone(), chan.ts.to_string(), member_tokens.join(",")]));
        }
        out.push(RawMessage::new(Some(state.own_sid.clone()), "EB", vec![]));
        out
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "PASS", vec![params.sendpass.unwrap_or("").to_string()]),
            RawMessage::new(
                None::<&str>,
                "SERVER",
                vec![
                    params.own_name.to_string(),
                    "1".to_string(),
                    now_ts().to_string(),
                    now_ts().to_string(),
                    "J10".to_string(),
                    format!("{}]]]", params.own_sid),
                    "+s".to_string(),
                    params.description.to_string(),
                ],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeTable;

    fn net() -> NetworkState {
        let mut n = NetworkState::new("P10Net", "AB", P10Adapter::new().capabilities());
        n.mode_table = ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+");
        n
    }

    #[test]
    fn spawn_client_allocates_sequential_numerics() {
        let adapter = P10Adapter::new();
        let mut state = net();
        let (uid1, _) = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Alice", ident: "alice", host: "host", realhost: "host", modes: &[],
                server: "AB", ip: None, realname: "Alice", ts: 1_700_000_000, opertype: None, manipulatable: false,
            })
            .unwrap();
        assert!(uid1.starts_with("AB"));
        assert!(state.users.contains(&uid1));
    }

    #[test]
    fn inbound_burst_applies_mode_flags_to_subsequent_numerics() {
        let adapter = P10Adapter::new();
        let mut state = net();
        let bus = HookBus::new();
        let line = RawMessage::parse(":AB B #test 1700000000 +nt :ABAAA:o,ABAAB").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        let chan = state.channel("#test").unwrap();
        assert!(chan.members.contains("ABAAA"));
        assert!(chan.members.contains("ABAAB"));
        assert!(chan.ranks_of("ABAAA").contains(&crate::modes::PrefixRank::Op));
        assert!(chan.ranks_of("ABAAB").contains(&crate::modes::PrefixRank::Op));
    }

    #[test]
    fn update_client_not_supported_on_p10() {
        let adapter = P10Adapter::new();
        let err = adapter.update_client("AB", "ABAAA", UpdatableField::Host, "new.host").unwrap_err();
        assert!(matches!(err, PylinkError::NotSupported(_)));
    }
}
