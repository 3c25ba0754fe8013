//! UnrealIRCd adapter (spec §4.3's UnrealIRCd row).
//!
//! Close cousin of [`super::ts6::Ts6Adapter`] — same SID-prefixed, glued
//! `@UID`-token `SJOIN` shape — but UnrealIRCd carries a wider `UID`
//! introduction line (virtual host and a services-login stamp alongside the
//! cloaked host) and updates live attributes with direct `CHGHOST`/
//! `CHGIDENT`/`CHGNAME`/`SVS2MODE` commands rather than TS6's `ENCAP`
//! wrapper, plus `SVSNICK` for server-forced nick changes.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{join_modes, parse_modes, ModeClass, ParsedMode};
use crate::state::{descendant_sids, Capabilities, NetworkState, Server, User};
use crate::wire::RawMessage;
use parking_lot::Mutex;

const UID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub struct UnrealAdapter {
    uid_counter: Mutex<u64>,
}

impl UnrealAdapter {
    pub fn new() -> Self {
        Self { uid_counter: Mutex::new(0) }
    }

    fn next_uid(&self, own_sid: &str) -> String {
        let mut counter = self.uid_counter.lock();
        let n = *counter;
        *counter += 1;
        let mut digits = [b'A'; 6];
        let mut v = n;
        for slot in digits.iter_mut().rev() {
            *slot = UID_ALPHABET[(v % 36) as usize];
            v /= 36;
        }
        format!("{own_sid}{}", String::from_utf8_lossy(&digits))
    }
}

impl Default for UnrealAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ip(s: &str) -> Option<std::net::IpAddr> {
    if s == "*" || s.is_empty() {
        None
    } else {
        s.parse().ok()
    }
}

fn user_snapshot(u: &User) -> UserSnapshot {
    UserSnapshot { uid: u.uid.clone(), nick: u.nick.clone(), ident: u.ident.clone(), host: u.host.clone(), channels: u.channels.iter().cloned().collect() }
}

impl ProtocolAdapter for UnrealAdapter {
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
            "UID" => {
                // UID <nick> <hopcount> <ts> <ident> <host> <uid> <servicestamp>
                //     <umodes> <vhost> <cloakedhost> <ip> :<gecos>
                let (Some(nick), Some(ts_str), Some(ident), Some(host), Some(uid), Some(umodes), Some(vhost), Some(ip_str), Some(gecos)) = (
                    line.arg(0), line.arg(2), line.arg(3), line.arg(4), line.arg(5), line.arg(7), line.arg(8), line.arg(10), line.args.last(),
                ) else {
                    return Ok(());
                };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let mut user = User::new(uid, nick, source.clone(), ts);
                user.ident = ident.to_string();
                user.realhost = host.to_string();
                user.host = vhost.to_string();
                user.cloaked_host = line.arg(9).unwrap_or(vhost).to_string();
                user.ip = parse_ip(ip_str);
                user.realname = gecos.clone();
                user.modes = umodes.trim_start_matches('+').chars().collect();
                user.opered = user.modes.contains(&'o');
                let servicestamp = line.arg(6).unwrap_or("0");
                if servicestamp != "0" {
                    user.services_account = Some(servicestamp.to_string());
                }
                state.users.insert(user);
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source: source.clone(),
                    ts,
                    payload: HookPayload::Uid {
                        uid: uid.to_string(),
                        nick: nick.to_string(),
                        realhost: host.to_string(),
                        host: vhost.to_string(),
                        ident: ident.to_string(),
                        ip: parse_ip(ip_str).map(|ip| ip.to_string()),
                        secure: None,
                    },
                });
            }
            "SJOIN" => {
                let (Some(ts_str), Some(chan_name)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
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
                    let split_at = tok.find(|c: char| c.is_alphanumeric()).unwrap_or(0);
                    let (prefix_str, uid) = tok.split_at(split_at);
                    let prefix_modes: Vec<ParsedMode> = prefix_str
                        .chars()
                        .filter_map(|c| state.mode_table.mode_for_symbol(c))
                        .map(|(ch, _)| ParsedMode::new(true, ch, Some(uid.to_string())))
                        .collect();
                    let chan = state.channel_or_create(chan_name);
                    chan.members.insert(uid.to_string());
                    chan.apply_modes(&table, &prefix_modes);
                    joined_uids.push(uid.to_string());
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
            "MODE" => {
                // MODE <target> [ts] <modes> [args...]; a channel target
                // carries a TS as its second arg, a user target never does.
                let Some(target) = line.arg(0) else { return Ok(()) };
                let is_channel = target.starts_with('#');
                let (ts, mode_start) = if is_channel {
                    (line.arg(1).and_then(|s| s.parse().ok()).unwrap_or_else(now_ts), 2)
                } else {
                    (now_ts(), 1)
                };
                let mode_tokens: Vec<&str> = line.args[mode_start..].iter().map(String::as_str).collect();
                let parsed = parse_modes(&mode_tokens, &state.mode_table, |s| Some(s.to_string()));
                let channeldata = if is_channel {
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
                    ts,
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
            "CHGHOST" => {
                let (Some(target), Some(newhost)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                if let Some(user) = state.users.get_mut(target) {
                    user.host = newhost.to_string();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Chghost { target: target.to_string(), newhost: newhost.to_string() },
                });
            }
            "CHGIDENT" => {
                let (Some(target), Some(newident)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                if let Some(user) = state.users.get_mut(target) {
                    user.ident = newident.to_string();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Chgident { target: target.to_string(), newident: newident.to_string() },
                });
            }
            "CHGNAME" => {
                let Some(target) = line.arg(0) else { return Ok(()) };
                let newgecos = line.args.last().cloned().unwrap_or_default();
                if let Some(user) = state.users.get_mut(target) {
                    user.realname = newgecos.clone();
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::Chgname { target: target.to_string(), newgecos },
                });
            }
            "SVS2MODE" => {
                // SVS2MODE <target> <modes> [account]
                let Some(target) = line.arg(0) else { return Ok(()) };
                if let Some(account) = line.arg(2) {
                    if let Some(user) = state.users.get_mut(target) {
                        user.services_account = Some(account.to_string());
                    }
                }
                bus.dispatch(&mut HookEvent {
                    network: state.network_name.clone(),
                    source,
                    ts: now_ts(),
                    payload: HookPayload::ClientServicesLogin { text: line.arg(2).map(String::from) },
                });
            }
            "SVSNICK" => {
                let (Some(target), Some(newnick)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
                let ts = now_ts();
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
            "SVSKILL" | "KILL" => {
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
            "SID" => {
                let (Some(name), Some(sid), Some(desc)) = (line.arg(0), line.arg(2), line.args.last()) else { return Ok(()) };
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
            "EOS" => {
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
            "PING" | "PONG" | "PROTOCTL" => {}
            _ => {}
        }
        Ok(())
    }

    fn spawn_client(&self, state: &mut NetworkState, p: SpawnClient<'_>) -> Result<(String, Vec<RawMessage>)> {
        let uid = self.next_uid(&state.own_sid);
        let modes_str = format!("+{}", p.modes.iter().map(|m| m.ch).collect::<String>());
        let mut user = User::new(uid.as_str(), p.nick, p.server, p.ts);
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
                p.nick.to_string(),
                "1".to_string(),
                p.ts.to_string(),
                p.ident.to_string(),
                p.realhost.to_string(),
                uid.clone(),
                "0".to_string(),
                modes_str,
                p.host.to_string(),
                p.host.to_string(),
                p.ip.unwrap_or("*").to_string(),
                p.realname.to_string(),
            ],
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
        let sid = sid.map(String::from).ok_or_else(|| PylinkError::InvalidArgument("sid required for UnrealIRCd SID".into()))?;
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
            "SID",
            vec![name.to_string(), "1".to_string(), sid.clone(), description.unwrap_or("PyLink").to_string()],
        );
        Ok((sid, vec![line]))
    }

    fn join(&self, state: &mut NetworkState, uid: &str, channel: &str) -> Result<Vec<RawMessage>> {
        let ts = state.channel_or_create(channel).ts;
        state.channel_or_create(channel).members.insert(uid.to_string());
        Ok(vec![RawMessage::new(Some(uid), "SJOIN", vec![ts.to_string(), channel.to_string()])])
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
        let user_tokens: Vec<String> = users.iter().map(|(prefix, uid)| format!("{prefix}{uid}")).collect();
        let mut args = vec![ts.to_string(), channel.to_string()];
        if mode_str.is_empty() {
            args.push("+".to_string());
        } else {
            args.extend(mode_str);
        }
        args.push(user_tokens.join(" "));
        Ok(vec![RawMessage::new(Some(sid), "SJOIN", args)])
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
        let mut args = vec![target.to_string()];
        if target.starts_with('#') {
            args.push(ts.unwrap_or_else(now_ts).to_string());
        }
        args.extend(mode_str);
        Ok(vec![RawMessage::new(Some(src), "MODE", args)])
    }

    fn update_client(&self, src: &str, uid: &str, field: UpdatableField, value: &str) -> Result<Vec<RawMessage>> {
        match field {
            UpdatableField::Host | UpdatableField::Realhost => Ok(vec![RawMessage::new(Some(src), "CHGHOST", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::Ident => Ok(vec![RawMessage::new(Some(src), "CHGIDENT", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::Gecos => Ok(vec![RawMessage::new(Some(src), "CHGNAME", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::ServicesAccount => {
                Ok(vec![RawMessage::new(Some(src), "SVS2MODE", vec![uid.to_string(), "+d".to_string(), value.to_string()])])
            }
            UpdatableField::Away => Err(PylinkError::NotSupported("UnrealIRCd AWAY is client-originated only")),
        }
    }

    fn send_burst(&self, state: &NetworkState) -> Vec<RawMessage> {
        let mut out = Vec::new();
        for user in state.users.iter() {
            let modes_str = format!("+{}", user.modes.iter().collect::<String>());
            out.push(RawMessage::new(
                Some(user.server_sid.clone()),
                "UID",
                vec![
                    user.nick.clone(),
                    "1".to_string(),
                    user.signon_ts.to_string(),
                    user.ident.clone(),
                    user.realhost.clone(),
                    user.uid.clone(),
                    user.services_account.clone().unwrap_or_else(|| "0".to_string()),
                    modes_str,
                    user.host.clone(),
                    user.cloaked_host.clone(),
                    user.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "*".to_string()),
                    user.realname.clone(),
                ],
            ));
        }
        for chan in state.channels_iter() {
            let member_tokens: Vec<String> = chan.members.iter().cloned().collect();
            out.push(RawMessage::new(Some(state.own_sid.clone()), "SJOIN", vec![chan.ts.to_string(), chan.name.clone(), "+".to_string(), member_tokens.join(" ")]));
        }
        out.push(RawMessage::new(Some(state.own_sid.clone()), "EOS", vec![]));
        out
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "PASS", vec![params.sendpass.unwrap_or("").to_string()]),
            RawMessage::new(None::<&str>, "PROTOCTL", vec!["NICKv2".to_string(), "VHP".to_string(), "UMODE2".to_string(), "NICKIP".to_string(), "SJOIN".to_string(), "SJOIN2".to_string(), "SJ3".to_string()]),
            RawMessage::new(None::<&str>, "SERVER", vec![params.own_name.to_string(), "1".to_string(), params.description.to_string()]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeTable;

    fn net() -> NetworkState {
        let mut n = NetworkState::new("UnrealNet", "1AA", UnrealAdapter::new().capabilities());
        n.mode_table = ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+");
        n
    }

    #[test]
    fn spawn_client_allocates_sequential_uids() {
        let adapter = UnrealAdapter::new();
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
    fn svsnick_is_a_forced_rename() {
        let adapter = UnrealAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        state.users.insert(User::new("1AAAAAAAA", "Baduser", "1AA", 1_700_000_000));
        let line = RawMessage::parse(":1AA SVSNICK 1AAAAAAAA Guest12345").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        assert_eq!(state.users.get("1AAAAAAAA").unwrap().nick, "Guest12345");
    }

    #[test]
    fn channel_mode_requires_ts_user_mode_does_not() {
        let adapter = UnrealAdapter::new();
        let mut state = net();
        let bus = HookBus::new();
        state.users.insert(User::new("1AAAAAAAA", "Alice", "1AA", 1_700_000_000));
        let line = RawMessage::parse(":1AAAAAAAA MODE 1AAAAAAAA +i").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        assert!(state.users.get("1AAAAAAAA").unwrap().modes.contains(&'i'));
    }
}
