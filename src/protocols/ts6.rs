//! TS6 adapter (charybdis/hybrid/ratbox family), grounded in this repository's
//! own TS6 handlers (`handlers/server/{uid,sjoin,tmode,topic,tb,kick,kill,
//! sid,squit}.rs`) minus their CRDT merge layer — PyLink's per-network state
//! is independently authoritative, so TS conflicts are resolved directly
//! against `Channel`/`NetworkState`, not merged through vector clocks.

use super::{ProtocolAdapter, RegisterParams, SpawnClient, UpdatableField};
use crate::error::{PylinkError, Result};
use crate::hooks::{now_ts, HookBus, HookEvent, HookPayload, UserSnapshot};
use crate::modes::{join_modes, parse_modes, ModeClass, ParsedMode};
use crate::state::{descendant_sids, Capabilities, NetworkState, Server, User};
use crate::wire::RawMessage;
use parking_lot::Mutex;

const UID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub struct Ts6Adapter {
    uid_counter: Mutex<u64>,
}

impl Ts6Adapter {
    pub fn new() -> Self {
        Self { uid_counter: Mutex::new(0) }
    }

    /// Next UID: own SID + 6 base-36 digits, matching TS6's fixed-width UID
    /// scheme (`handlers/server/uid.rs`'s `UID <...> <uid>` framing). The
    /// teacher receives UIDs pre-allocated off the wire from its CRDT layer;
    /// here PyLink originates the client, so it must allocate the UID itself.
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

impl Default for Ts6Adapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ip(s: &str) -> Option<std::net::IpAddr> {
    if s == "0" {
        None
    } else {
        s.parse().ok()
    }
}

impl ProtocolAdapter for Ts6Adapter {
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
                // UID <nick> <hopcount> <ts> <umodes> <ident> <host> <ip> <uid> :<gecos>
                let (Some(nick), Some(ts_str), Some(umodes), Some(ident), Some(host), Some(ip_str), Some(uid), Some(gecos)) = (
                    line.arg(0), line.arg(2), line.arg(3), line.arg(4), line.arg(5), line.arg(6), line.arg(7), line.args.last(),
                ) else {
                    return Ok(());
                };
                let ts: i64 = ts_str.parse().unwrap_or(0);
                let mut user = User::new(uid, nick, source.clone(), ts);
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
                        uid: uid.to_string(),
                        nick: nick.to_string(),
                        realhost: host.to_string(),
                        host: host.to_string(),
                        ident: ident.to_string(),
                        ip: parse_ip(ip_str).map(|ip| ip.to_string()),
                        secure: None,
                    },
                });
            }
            "SJOIN" => {
                // SJOIN <ts> <chan> <modes> [args...] :<uid tokens>
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
            "TMODE" => {
                // TMODE <ts> <chan> <modes> [args...]
                let (Some(ts_str), Some(target)) = (line.arg(0), line.arg(1)) else { return Ok(()) };
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
                // MODE <nick/uid> <modes> [args...] (user's own modes, no TS)
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
            "TOPIC" | "TB" => {
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
            "SID" => {
                // SID <name> <hopcount> <sid> :<desc>
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
            "EOB" => {
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
                modes_str,
                p.ident.to_string(),
                p.host.to_string(),
                p.ip.unwrap_or("0").to_string(),
                uid.clone(),
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
        let sid = sid.map(String::from).ok_or_else(|| PylinkError::InvalidArgument("sid required for TS6 SID".into()))?;
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

        // Prefix-rank entries ride along in the SJOIN user-token prefixes
        // (e.g. `@UID`), not in the mode-string argument list.
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
        let command = if target.starts_with('#') { "TMODE" } else { "MODE" };
        let mut args = Vec::new();
        if target.starts_with('#') {
            args.push(ts.unwrap_or_else(now_ts).to_string());
        }
        args.push(target.to_string());
        args.extend(mode_str);
        Ok(vec![RawMessage::new(Some(src), command, args)])
    }

    fn update_client(&self, src: &str, uid: &str, field: UpdatableField, value: &str) -> Result<Vec<RawMessage>> {
        match field {
            UpdatableField::Host => Ok(vec![RawMessage::new(Some(src), "CHGHOST", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::Ident => Ok(vec![RawMessage::new(Some(src), "CHGIDENT", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::Gecos => Ok(vec![RawMessage::new(Some(src), "CHGNAME", vec![uid.to_string(), value.to_string()])]),
            UpdatableField::ServicesAccount => {
                Ok(vec![RawMessage::new(Some(src), "ENCAP", vec!["*".to_string(), "SU".to_string(), uid.to_string(), value.to_string()])])
            }
            UpdatableField::Realhost | UpdatableField::Away => {
                Err(PylinkError::NotSupported("TS6 has no wire command for this field"))
            }
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
                    modes_str,
                    user.ident.clone(),
                    user.host.clone(),
                    user.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "0".to_string()),
                    user.uid.clone(),
                    user.realname.clone(),
                ],
            ));
        }
        for chan in state.channels_iter() {
            let member_tokens: Vec<String> = chan.members.iter().cloned().collect();
            out.push(RawMessage::new(Some(state.own_sid.clone()), "SJOIN", vec![chan.ts.to_string(), chan.name.clone(), "+".to_string(), member_tokens.join(" ")]));
        }
        out.push(RawMessage::new(Some(state.own_sid.clone()), "EOB", vec![]));
        out
    }

    fn register_lines(&self, params: &RegisterParams<'_>) -> Vec<RawMessage> {
        vec![
            RawMessage::new(None::<&str>, "PASS", vec![params.sendpass.unwrap_or("").to_string(), "TS".to_string(), "6".to_string(), params.own_sid.to_string()]),
            RawMessage::new(None::<&str>, "CAPAB", vec!["QS EX CHW IE KNOCK TB SAVE EUID ENCAP SERVICES".to_string()]),
            RawMessage::new(None::<&str>, "SERVER", vec![params.own_name.to_string(), "1".to_string(), params.description.to_string()]),
            RawMessage::new(None::<&str>, "SVINFO", vec!["6".to_string(), "6".to_string(), "0".to_string(), now_ts().to_string()]),
        ]
    }
}

fn user_snapshot(u: &User) -> UserSnapshot {
    UserSnapshot { uid: u.uid.clone(), nick: u.nick.clone(), ident: u.ident.clone(), host: u.host.clone(), channels: u.channels.iter().cloned().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeTable;

    fn net() -> NetworkState {
        let mut n = NetworkState::new("TS6Net", "1AA", Ts6Adapter::new().capabilities());
        n.mode_table = ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+");
        n
    }

    #[test]
    fn spawn_client_allocates_sequential_uids() {
        let adapter = Ts6Adapter::new();
        let mut state = net();
        let (uid1, _) = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Alice", ident: "alice", host: "host", realhost: "host", modes: &[],
                server: "1AA", ip: None, realname: "Alice", ts: 1_700_000_000, opertype: None, manipulatable: false,
            })
            .unwrap();
        let (uid2, _) = adapter
            .spawn_client(&mut state, SpawnClient {
                nick: "Bob", ident: "bob", host: "host", realhost: "host", modes: &[],
                server: "1AA", ip: None, realname: "Bob", ts: 1_700_000_000, opertype: None, manipulatable: false,
            })
            .unwrap();
        assert_ne!(uid1, uid2);
        assert!(uid1.starts_with("1AA"));
        assert!(state.users.contains(&uid1));
    }

    #[test]
    fn inbound_uid_line_materializes_user_and_fires_hook() {
        let adapter = Ts6Adapter::new();
        let mut state = net();
        let bus = HookBus::new();
        let fired = std::sync::Arc::new(parking_lot::Mutex::new(false));
        let f = fired.clone();
        bus.add_hook(Some("UID"), 100, move |_| {
            *f.lock() = true;
            crate::hooks::Outcome::Continue
        });
        let line = RawMessage::parse(":1AA UID Alice 1 1700000000 +i ~alice host.example 1.2.3.4 1AAAAAAAA :Alice Example").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        assert!(*fired.lock());
        assert!(state.users.contains("1AAAAAAAA"));
    }

    #[test]
    fn inbound_sjoin_applies_prefix_and_fires_join_hook() {
        let adapter = Ts6Adapter::new();
        let mut state = net();
        let bus = HookBus::new();
        let line = RawMessage::parse(":1AA SJOIN 1700000000 #test +nt :@1AAAAAAAA 1AAAAAAAB").unwrap();
        adapter.handle_line(&mut state, &bus, &line).unwrap();
        let chan = state.channel("#test").unwrap();
        assert!(chan.members.contains("1AAAAAAAA"));
        assert!(chan.members.contains("1AAAAAAAB"));
        assert!(chan.ranks_of("1AAAAAAAA").contains(&crate::modes::PrefixRank::Op));
        assert!(chan.ranks_of("1AAAAAAAB").is_empty());
    }

    #[test]
    fn not_supported_field_errors() {
        let adapter = Ts6Adapter::new();
        let err = adapter.update_client("1AA", "1AAAAAAAA", UpdatableField::Away, "afk").unwrap_err();
        assert!(matches!(err, PylinkError::NotSupported(_)));
    }
}
