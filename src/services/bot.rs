//! The `ServiceBot` runtime (spec §4.5): one pseudo-client per network per
//! named bot (e.g. `relay`), a command table, dynamic channel membership,
//! and reply routing. Grounded in the teacher's `services/base.rs`
//! `ServiceBase` trait (`reply_effect`/`reply_effects`/`error_reply`) for
//! the reply shape, adapted for PyLink's architecture: the teacher returns
//! a `ServiceEffect` for a separate apply step, but PyLink already routes
//! everything asynchronously through `NetworkHandle::send`, so replies are
//! queued directly rather than returned as an effect to apply later.

use super::command::{wrap_reply, CommandEntry};
use crate::error::PylinkError;
use crate::modes::{HostmaskSubject, PrefixRank};
use crate::permissions::PermissionSubject;
use crate::wire::RawMessage;
use crate::world::World;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

/// Where a command line came from: a private query (always replied to by
/// notice) or a fantasy command in a channel (replied to the channel
/// unless the bot prefers private replies — spec §4.5).
#[derive(Debug, Clone)]
pub enum Origin {
    Private,
    Fantasy(String),
}

/// Everything a command handler needs, owned rather than borrowed so
/// handlers can be `'static` async closures (spec §4.5's command table).
pub struct CommandContext {
    pub world: Arc<World>,
    pub network: String,
    pub source_uid: String,
    pub origin: Origin,
    pub args: Vec<String>,
}

pub struct ServiceBot {
    pub name: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
    pub prefer_private_replies: bool,
    commands: RwLock<HashMap<&'static str, Arc<CommandEntry>>>,
    aliases: RwLock<HashMap<&'static str, &'static str>>,
    /// (network, channel) -> namespaces currently pinning the bot there
    /// (spec §4.5's `add_persistent_channel`/`remove_persistent_channel`).
    dynamic_channels: DashMap<(String, String), HashSet<String>>,
    /// network -> this bot's own spawned UID there.
    uids: DashMap<String, String>,
}

impl ServiceBot {
    pub fn new(name: impl Into<String>, nick: impl Into<String>, ident: impl Into<String>, host: impl Into<String>, realname: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            nick: nick.into(),
            ident: ident.into(),
            host: host.into(),
            realname: realname.into(),
            prefer_private_replies: false,
            commands: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            dynamic_channels: DashMap::new(),
            uids: DashMap::new(),
        })
    }

    pub fn add_command(&self, entry: CommandEntry) {
        let mut aliases = self.aliases.write();
        for alias in entry.aliases {
            aliases.insert(alias, entry.name);
        }
        self.commands.write().insert(entry.name, Arc::new(entry));
    }

    fn lookup(&self, word: &str) -> Option<Arc<CommandEntry>> {
        let lower: &str = &word.to_ascii_lowercase();
        if let Some(entry) = self.commands.read().get(lower) {
            return Some(Arc::clone(entry));
        }
        let primary = *self.aliases.read().get(lower)?;
        self.commands.read().get(primary).cloned()
    }

    pub fn list_featured(&self) -> Vec<&'static str> {
        self.commands.read().values().filter(|e| e.featured).map(|e| e.name).collect()
    }

    pub fn set_uid(&self, network: impl Into<String>, uid: impl Into<String>) {
        self.uids.insert(network.into(), uid.into());
    }

    pub fn uid(&self, network: &str) -> Option<String> {
        self.uids.get(network).map(|e| e.value().clone())
    }

    pub fn clear_uid(&self, network: &str) {
        self.uids.remove(network);
    }

    /// Pin this bot into `channel` on `network` under `namespace` (e.g. a
    /// relay home-channel name). The bot joins once the channel is known to
    /// exist, or unconditionally on protocols whose capability set is
    /// `visible_state_only` (spec §4.5).
    pub fn add_persistent_channel(&self, network: &str, channel: &str, namespace: &str) {
        self.dynamic_channels
            .entry((network.to_string(), channel.to_string()))
            .or_default()
            .insert(namespace.to_string());
    }

    /// Unpin `namespace`; returns `true` if no namespace still pins the
    /// channel (the caller should part the bot).
    pub fn remove_persistent_channel(&self, network: &str, channel: &str, namespace: &str) -> bool {
        let key = (network.to_string(), channel.to_string());
        let mut empty = true;
        if let Some(mut entry) = self.dynamic_channels.get_mut(&key) {
            entry.remove(namespace);
            empty = entry.is_empty();
        }
        if empty {
            self.dynamic_channels.remove(&key);
        }
        empty
    }

    pub fn is_pinned(&self, network: &str, channel: &str) -> bool {
        self.dynamic_channels.contains_key(&(network.to_string(), channel.to_string()))
    }

    /// Dispatch one inbound line (PRIVMSG targeting this bot, or a fantasy
    /// command in a pinned channel) to its command handler, including the
    /// permission check and reply routing (spec §4.5, §4.6).
    pub async fn dispatch(self: &Arc<Self>, world: Arc<World>, network: String, source_uid: String, origin: Origin, line: &str) {
        let mut parts = line.trim().split_whitespace();
        let Some(cmd_word) = parts.next() else { return };
        let args: Vec<String> = parts.map(String::from).collect();

        let Some(entry) = self.lookup(cmd_word) else {
            self.reply(&world, &network, &source_uid, &origin, vec![format!("Unknown command \x02{cmd_word}\x02.")]).await;
            return;
        };

        if let Some(node) = entry.permission_node {
            if let Err(e) = self.check_permission(&world, &network, &source_uid, node).await {
                self.reply(&world, &network, &source_uid, &origin, vec![e.to_user_notice()]).await;
                return;
            }
        }

        let ctx = CommandContext { world: Arc::clone(&world), network: network.clone(), source_uid: source_uid.clone(), origin: origin.clone(), args };
        let lines = (entry.handler)(ctx).await;
        self.reply(&world, &network, &source_uid, &origin, lines).await;
    }

    async fn check_permission(&self, world: &Arc<World>, network: &str, source_uid: &str, node: &'static str) -> crate::error::Result<()> {
        let handle = world.network(network).ok_or_else(|| PylinkError::NotFound(format!("network {network}")))?;
        let user = handle
            .query_user(source_uid)
            .await
            .ok_or_else(|| PylinkError::NotFound(format!("user {source_uid}")))?;
        let ip: Option<IpAddr> = user.ip.as_deref().and_then(|s| s.parse().ok());
        let channel_ranks: HashMap<String, PrefixRank> =
            user.channel_ranks.iter().filter_map(|(chan, rank)| rank.map(|r| (chan.clone(), r))).collect();
        let subject = PermissionSubject {
            host: HostmaskSubject { nick: &user.nick, ident: &user.ident, host: &user.host, ip },
            account: user.services_account.as_deref(),
            is_ircop: user.opered,
            opertype: user.opertype.as_deref(),
            network,
            server_name: network,
            server_sid: &user.server_sid,
            pylink_login: None,
            channel_ranks,
        };
        world.permissions.check(&subject, &[node])
    }

    async fn reply(&self, world: &Arc<World>, network: &str, source_uid: &str, origin: &Origin, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        let Some(handle) = world.network(network) else { return };
        let Some(bot_uid) = self.uid(network) else { return };
        let (target, as_notice) = match origin {
            Origin::Private => (source_uid.to_string(), true),
            Origin::Fantasy(channel) => {
                if self.prefer_private_replies {
                    (source_uid.to_string(), true)
                } else {
                    (channel.clone(), false)
                }
            }
        };
        for line in lines {
            for wrapped in wrap_reply(&line) {
                let msg = if as_notice {
                    RawMessage::new(Some(bot_uid.clone()), "NOTICE", vec![target.clone(), wrapped])
                } else {
                    RawMessage::new(Some(bot_uid.clone()), "PRIVMSG", vec![target.clone(), wrapped])
                };
                handle.send(msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_aliases_case_insensitively() {
        let bot = ServiceBot::new("relay", "Relay", "relay", "services.example", "Relay Service");
        bot.add_command(CommandEntry {
            name: "create",
            aliases: &["mk"],
            permission_node: Some("relay.create"),
            featured: true,
            handler: Arc::new(|_| Box::pin(async { vec!["ok".to_string()] })),
        });
        assert!(bot.lookup("CREATE").is_some());
        assert!(bot.lookup("mk").is_some());
        assert!(bot.lookup("nonexistent").is_none());
    }

    #[test]
    fn persistent_channel_pin_and_unpin() {
        let bot = ServiceBot::new("relay", "Relay", "relay", "services.example", "Relay Service");
        bot.add_persistent_channel("net1", "#test", "relay:net1:#test");
        assert!(bot.is_pinned("net1", "#test"));
        let fully_unpinned = bot.remove_persistent_channel("net1", "#test", "relay:net1:#test");
        assert!(fully_unpinned);
        assert!(!bot.is_pinned("net1", "#test"));
    }
}
