//! The Relay engine itself: an async background task consuming hook
//! events forwarded from every network's hook dispatch, spawning/tracking
//! puppet clones, and relaying channel traffic and mode state across
//! linked channels (spec §4.7).
//!
//! Grounded in the network driver's own sync-hook/async-consumer split
//! (`src/network/event_loop.rs`'s doc comment): a synchronous hook handler
//! can never `.await` a reply from its own owning task, so Relay never runs
//! inline inside `HookBus::dispatch` — it only clones events onto an
//! `mpsc` channel there and does all of its actual work, including the
//! `NetworkHandle::query_user`/`with_state` round trips, from this task.

use super::db::{RelayChannelEntry, RelayDb};
use super::policy;
use crate::config::RelayConfig;
use crate::error::{PylinkError, Result};
use crate::hooks::{HookEvent, HookPayload, Outcome};
use crate::modes::ParsedMode;
use crate::network::{NetworkMeta, OwnedSpawnClient};
use crate::services::ServiceBot;
use crate::world::{Plugin, World};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

fn invert_pools(pools: &HashMap<String, Vec<String>>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (pool, members) in pools {
        for member in members {
            out.insert(member.clone(), pool.clone());
        }
    }
    out
}

pub struct RelayEngine {
    world: Arc<World>,
    db: Mutex<RelayDb>,
    bot: Arc<ServiceBot>,
    /// network -> casefolded nicks currently in use there, maintained from
    /// UID/NICK/QUIT hooks so puppet spawning can pick an untaken tag
    /// without round-tripping a query per attempt.
    nick_cache: DashMap<String, HashSet<String>>,
    meta_cache: DashMap<String, NetworkMeta>,
    share_pools: HashMap<String, String>,
    kill_pools: HashMap<String, String>,
    save_interval: Duration,
}

impl RelayEngine {
    pub fn install(world: Arc<World>, bot: Arc<ServiceBot>, config: &RelayConfig) -> Result<Arc<Self>> {
        let db = RelayDb::open(&config.db_path)?;
        let engine = Arc::new(Self {
            world: Arc::clone(&world),
            db: Mutex::new(db),
            bot,
            nick_cache: DashMap::new(),
            meta_cache: DashMap::new(),
            share_pools: invert_pools(&config.ip_share_pools),
            kill_pools: invert_pools(&config.kill_share_pools),
            save_interval: Duration::from_secs(config.save_interval_secs),
        });

        super::commands::register(&engine.bot, Arc::clone(&engine));
        world.register_service(Arc::clone(&engine.bot));

        let (tx, rx) = mpsc::unbounded_channel();
        world.hooks.add_hook(None, 40, move |event: &mut HookEvent| {
            let _ = tx.send(event.clone());
            Outcome::Continue
        });

        world.register_plugin(Arc::clone(&engine) as Arc<dyn Plugin>);
        world.set_relay(Arc::clone(&engine));

        let run_engine = Arc::clone(&engine);
        tokio::spawn(async move { run_engine.run(rx).await });

        let save_engine = Arc::clone(&engine);
        tokio::spawn(async move { save_engine.save_loop().await });

        Ok(engine)
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<HookEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn save_loop(self: Arc<Self>) {
        let mut shutdown = self.world.shutdown_subscribe();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.save_interval) => {
                    if let Err(e) = self.save() {
                        warn!(error = %e, "relay db periodic save failed");
                    }
                }
                _ = shutdown.recv() => {
                    let _ = self.save();
                    break;
                }
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.db.lock().save()
    }

    fn shares_ip(&self, a: &str, b: &str) -> bool {
        matches!((self.share_pools.get(a), self.share_pools.get(b)), (Some(x), Some(y)) if x == y)
    }

    async fn meta_of(&self, network: &str) -> Option<NetworkMeta> {
        if let Some(meta) = self.meta_cache.get(network) {
            return Some(meta.clone());
        }
        let handle = self.world.network(network)?;
        let meta = handle.query_meta().await?;
        self.meta_cache.insert(network.to_string(), meta.clone());
        Some(meta)
    }

    fn note_nick(&self, network: &str, nick: &str) {
        self.nick_cache.entry(network.to_string()).or_default().insert(nick.to_ascii_lowercase());
    }

    fn forget_nick(&self, network: &str, nick: &str) {
        if let Some(mut set) = self.nick_cache.get_mut(network) {
            set.remove(&nick.to_ascii_lowercase());
        }
    }

    fn is_puppet(&self, network: &str, uid: &str) -> bool {
        self.db.lock().owner_of_puppet(network, uid).is_some()
    }

    fn home_pair(&self, network: &str, channel: &str) -> Option<(String, String)> {
        self.db.lock().home_of(network, channel)
    }

    fn other_links(&self, home: &(String, String), exclude_net: &str, exclude_chan: &str) -> Vec<(String, String)> {
        self.db
            .lock()
            .linked_set(&home.0, &home.1)
            .into_iter()
            .filter(|(n, c)| !(n == exclude_net && c == exclude_chan))
            .collect()
    }

    /// Look up or spawn the puppet representing `(home_net, home_uid)` on
    /// `leaf_net` (spec §4.7's clone spawning with nick-tagging).
    async fn ensure_puppet(&self, home_net: &str, home_uid: &str, leaf_net: &str) -> Result<String> {
        if let Some(existing) = self.db.lock().puppet_uid(home_net, home_uid, leaf_net).map(str::to_string) {
            return Ok(existing);
        }
        let home_handle = self
            .world
            .network(home_net)
            .ok_or_else(|| PylinkError::NotFound(format!("network {home_net}")))?;
        let user = home_handle
            .query_user(home_uid)
            .await
            .ok_or_else(|| PylinkError::NotFound(format!("user {home_uid}")))?;
        let leaf_handle = self
            .world
            .network(leaf_net)
            .ok_or_else(|| PylinkError::NotFound(format!("network {leaf_net}")))?;
        let leaf_meta = self.meta_of(leaf_net).await.unwrap_or_default();

        let taken = self.nick_cache.get(leaf_net).map(|s| s.clone()).unwrap_or_default();
        let candidates = policy::tag_nick_candidates(&user.nick, home_net);
        let nick = policy::pick_untaken_nick(&candidates, &taken)
            .unwrap_or_else(|| format!("{}-{}", &user.uid[..user.uid.len().min(6)], home_net));

        let ip = if self.shares_ip(home_net, leaf_net) { user.ip.clone() } else { None };
        let req = OwnedSpawnClient {
            nick: nick.clone(),
            ident: user.ident.clone(),
            host: if ip.is_some() { user.host.clone() } else { format!("{home_net}/user") },
            realhost: user.realhost.clone(),
            modes: Vec::new(),
            server: leaf_meta.own_sid,
            ip,
            realname: format!("{} ({})", user.realname, home_net),
            ts: crate::hooks::now_ts(),
            opertype: None,
            manipulatable: true,
        };
        let puppet_uid = leaf_handle.spawn_client(req).await?;
        self.note_nick(leaf_net, &nick);
        self.db.lock().record_puppet(home_net, home_uid, leaf_net, &puppet_uid);
        Ok(puppet_uid)
    }

    async fn handle_event(&self, event: HookEvent) {
        let network = event.network.clone();
        match event.payload {
            HookPayload::Uid { nick, .. } => self.note_nick(&network, &nick),
            HookPayload::Nick { newnick, oldnick } => {
                self.forget_nick(&network, &oldnick);
                self.note_nick(&network, &newnick);
                self.handle_nick(&network, &event.source, &newnick).await;
            }
            HookPayload::Join { channel, users, .. } => self.handle_join(&network, &channel, &users).await,
            HookPayload::Part { channels, text } => self.handle_part(&network, &event.source, &channels, text.as_deref()).await,
            HookPayload::Quit { .. } => self.handle_quit(&network, &event.source).await,
            HookPayload::Kill { target, .. } => self.handle_kill(&network, &target).await,
            HookPayload::Kick { channel, target, text } => self.handle_kick(&network, &channel, &target, text.as_deref()).await,
            HookPayload::Privmsg { target, text } => self.handle_chat(&network, &event.source, &target, &text, false).await,
            HookPayload::Notice { target, text } => self.handle_chat(&network, &event.source, &target, &text, true).await,
            HookPayload::Mode { target, modes, .. } => self.handle_mode(&network, &event.source, &target, &modes).await,
            HookPayload::Endburst => self.ensure_bot_spawned(&network).await,
            _ => {}
        }
    }

    /// Spawn the Relay bot's own pseudo-client on a freshly-bursted
    /// network, if it isn't already there.
    async fn ensure_bot_spawned(&self, network: &str) {
        if self.bot.uid(network).is_some() {
            return;
        }
        let Some(handle) = self.world.network(network) else { return };
        let Some(meta) = self.meta_of(network).await else { return };
        let req = OwnedSpawnClient {
            nick: self.bot.nick.clone(),
            ident: self.bot.ident.clone(),
            host: self.bot.host.clone(),
            realhost: self.bot.host.clone(),
            modes: Vec::new(),
            server: meta.own_sid,
            ip: None,
            realname: self.bot.realname.clone(),
            ts: crate::hooks::now_ts(),
            opertype: None,
            manipulatable: false,
        };
        match handle.spawn_client(req).await {
            Ok(uid) => self.bot.set_uid(network, uid),
            Err(e) => warn!(network, error = %e, "failed to spawn relay service bot"),
        }
    }

    async fn handle_join(&self, network: &str, channel: &str, users: &[String]) {
        let Some(home) = self.home_pair(network, channel) else { return };
        let leaves = self.other_links(&home, network, channel);
        for uid in users {
            if self.is_puppet(network, uid) {
                continue;
            }
            for (leaf_net, leaf_chan) in &leaves {
                if let Err(e) = self.relay_join(network, uid, leaf_net, leaf_chan).await {
                    warn!(home_network = network, leaf_network = %leaf_net, error = %e, "relay join failed");
                }
            }
        }
    }

    async fn relay_join(&self, home_net: &str, home_uid: &str, leaf_net: &str, leaf_chan: &str) -> Result<()> {
        let puppet_uid = self.ensure_puppet(home_net, home_uid, leaf_net).await?;
        let handle = self
            .world
            .network(leaf_net)
            .ok_or_else(|| PylinkError::NotFound(format!("network {leaf_net}")))?;
        let chan = leaf_chan.to_string();
        handle.with_state(Box::new(move |state, adapter| adapter.join(state, &puppet_uid, &chan).unwrap_or_default()));
        Ok(())
    }

    async fn handle_part(&self, network: &str, source: &str, channels: &[String], reason: Option<&str>) {
        if self.is_puppet(network, source) {
            return;
        }
        for channel in channels {
            let Some(home) = self.home_pair(network, channel) else { continue };
            for (leaf_net, leaf_chan) in self.other_links(&home, network, channel) {
                let Some(puppet_uid) = self.db.lock().puppet_uid(network, source, &leaf_net).map(str::to_string) else { continue };
                let Some(handle) = self.world.network(&leaf_net) else { continue };
                let chan = leaf_chan.clone();
                let reason = reason.map(String::from);
                handle.with_state(Box::new(move |state, adapter| adapter.part(state, &puppet_uid, &chan, reason.as_deref()).unwrap_or_default()));
            }
        }
    }

    async fn handle_quit(&self, network: &str, source: &str) {
        if self.is_puppet(network, source) {
            return;
        }
        let leaves: Vec<(String, String)> = {
            let db = self.db.lock();
            db.data
                .relay_users
                .get(&(network.to_string(), source.to_string()))
                .map(|m| m.iter().map(|(n, u)| (n.clone(), u.clone())).collect())
                .unwrap_or_default()
        };
        for (leaf_net, puppet_uid) in leaves {
            let Some(handle) = self.world.network(&leaf_net) else { continue };
            let uid = puppet_uid.clone();
            handle.with_state(Box::new(move |state, adapter| adapter.quit(state, &uid, "relay: home user quit").unwrap_or_default()));
            self.db.lock().forget_puppet(&leaf_net, &puppet_uid);
        }
    }

    /// A foreign network's server killed a puppet (spec §4.7's kill
    /// policy): if this pair of networks shares a kill pool and the leaf
    /// actually has S2S KILL, the kill stands; otherwise it's treated as a
    /// desync to recover from on next activity rather than something that
    /// can be undone after the fact.
    async fn handle_kill(&self, network: &str, target: &str) {
        let Some((home_net, home_uid)) = self.db.lock().owner_of_puppet(network, target).cloned() else { return };
        let leaf_has_kill = self.meta_of(network).await.is_some();
        let authoritative = policy::kill_is_authoritative(&self.kill_pools, &home_net, network, leaf_has_kill);
        self.db.lock().forget_puppet(network, target);
        if !authoritative {
            warn!(home_network = %home_net, home_uid = %home_uid, leaf_network = network, "puppet killed outside its kill-share pool; not re-spawning eagerly");
        }
    }

    async fn handle_kick(&self, network: &str, channel: &str, target: &str, _reason: Option<&str>) {
        let Some(home) = self.home_pair(network, channel) else { return };
        if !self.is_puppet(network, target) {
            return;
        }
        let entry = { self.db.lock().channel(&home.0, &home.1).cloned() };
        let Some(entry) = entry else { return };
        if policy::claim_permits(&entry, network) {
            return; // kicking network is entitled to police this channel
        }
        // Not entitled: force the puppet back in rather than honoring the kick.
        let Some(owner) = self.db.lock().owner_of_puppet(network, target).cloned() else { return };
        let _ = self.relay_join(&owner.0, &owner.1, network, channel).await;
    }

    async fn handle_nick(&self, network: &str, source: &str, newnick: &str) {
        if self.is_puppet(network, source) {
            return;
        }
        let leaves: Vec<(String, String)> = {
            let db = self.db.lock();
            db.data
                .relay_users
                .get(&(network.to_string(), source.to_string()))
                .map(|m| m.iter().map(|(n, u)| (n.clone(), u.clone())).collect())
                .unwrap_or_default()
        };
        for (leaf_net, puppet_uid) in leaves {
            let taken = self.nick_cache.get(&leaf_net).map(|s| s.clone()).unwrap_or_default();
            let candidates = policy::tag_nick_candidates(newnick, network);
            let Some(tagged) = policy::pick_untaken_nick(&candidates, &taken) else { continue };
            let Some(handle) = self.world.network(&leaf_net) else { continue };
            let uid = puppet_uid.clone();
            let tagged_for_task = tagged.clone();
            handle.with_state(Box::new(move |state, adapter| adapter.nick(state, &uid, &tagged_for_task).unwrap_or_default()));
            self.note_nick(&leaf_net, &tagged);
        }
    }

    async fn handle_chat(&self, network: &str, source: &str, target: &str, text: &str, notice: bool) {
        if self.is_puppet(network, source) {
            return;
        }
        let Some(home) = self.home_pair(network, target) else { return };
        for (leaf_net, leaf_chan) in self.other_links(&home, network, target) {
            let Ok(puppet_uid) = self.ensure_puppet(network, source, &leaf_net).await else { continue };
            let Some(handle) = self.world.network(&leaf_net) else { continue };
            let line = if notice {
                crate::wire::RawMessage::new(Some(puppet_uid), "NOTICE", vec![leaf_chan.clone(), text.to_string()])
            } else {
                crate::wire::RawMessage::new(Some(puppet_uid), "PRIVMSG", vec![leaf_chan.clone(), text.to_string()])
            };
            handle.send(line);
        }
    }

    async fn handle_mode(&self, network: &str, _source: &str, target: &str, modes: &[ParsedMode]) {
        let Some(home) = self.home_pair(network, target) else { return };
        let entry = { self.db.lock().channel(&home.0, &home.1).cloned() };
        let Some(entry) = entry else { return };
        let Some(meta) = self.meta_of(network).await else { return };
        let (allowed, rejected) = policy::apply_claim(&entry, network, modes, |c| meta.prefix_chars.contains(&c));

        if !rejected.is_empty() {
            self.bounce_modes(network, target, &rejected).await;
        }
        if allowed.is_empty() {
            return;
        }

        for (leaf_net, leaf_chan) in self.other_links(&home, network, target) {
            let Some(leaf_entry) = self.db.lock().channel(&home.0, &home.1).cloned() else { continue };
            let filtered = policy::apply_linkacl(&leaf_entry, &allowed);
            let filtered = policy::apply_modedelta(&leaf_entry, &leaf_net, filtered);
            if filtered.is_empty() {
                continue;
            }
            let Some(handle) = self.world.network(&leaf_net) else { continue };
            let chan = leaf_chan.clone();
            handle.with_state(Box::new(move |state, adapter| {
                let src = state.own_sid.clone();
                adapter.mode(state, &src, &chan, &filtered, None).unwrap_or_default()
            }));
        }
    }

    async fn bounce_modes(&self, network: &str, channel: &str, rejected: &[ParsedMode]) {
        let Some(handle) = self.world.network(network) else { return };
        let chan = channel.to_string();
        let rejected = rejected.to_vec();
        handle.with_state(Box::new(move |state, adapter| {
            let reversal = match state.channel(&chan) {
                Ok(c) => c.reverse_modes(&state.mode_table, &rejected),
                Err(_) => return Vec::new(),
            };
            if reversal.is_empty() {
                return Vec::new();
            }
            let src = state.own_sid.clone();
            adapter.mode(state, &src, &chan, &reversal, None).unwrap_or_default()
        }));
    }

    // --- service-command surface (src/relay/commands.rs) ---

    pub fn create_channel(&self, home_net: &str, home_chan: &str) {
        self.db.lock().create_channel(home_net, home_chan);
    }

    pub fn destroy_channel(&self, home_net: &str, home_chan: &str) {
        self.db.lock().destroy_channel(home_net, home_chan);
    }

    pub fn link(&self, home_net: &str, home_chan: &str, leaf_net: &str, leaf_chan: &str) -> bool {
        self.db.lock().link(home_net, home_chan, leaf_net, leaf_chan)
    }

    pub fn delink(&self, home_net: &str, home_chan: &str, leaf_net: &str, leaf_chan: &str) -> bool {
        self.db.lock().delink(home_net, home_chan, leaf_net, leaf_chan)
    }

    pub fn linked_set(&self, home_net: &str, home_chan: &str) -> Vec<(String, String)> {
        self.db.lock().linked_set(home_net, home_chan)
    }

    pub fn channel_entry(&self, home_net: &str, home_chan: &str) -> Option<RelayChannelEntry> {
        self.db.lock().channel(home_net, home_chan).cloned()
    }

    /// Resolve any (network, channel) pair a command was issued against —
    /// home or leaf — to its home pair, for commands that take a bare
    /// channel name local to the issuing network.
    pub fn channel_entry_home(&self, network: &str, channel: &str) -> Option<(String, String)> {
        self.db.lock().home_of(network, channel)
    }

    pub fn set_claim(&self, home_net: &str, home_chan: &str, nets: HashSet<String>) {
        if let Some(entry) = self.db.lock().data.relay_channels.get_mut(&(home_net.to_string(), home_chan.to_string())) {
            entry.claim_nets = nets;
        }
    }

    pub fn set_linkacl(&self, home_net: &str, home_chan: &str, mode: bool, set: HashSet<char>) {
        if let Some(entry) = self.db.lock().data.relay_channels.get_mut(&(home_net.to_string(), home_chan.to_string())) {
            entry.linkacl_mode = mode;
            entry.linkacl_set = set;
        }
    }

    pub fn set_chandesc(&self, home_net: &str, home_chan: &str, text: Option<String>) {
        if let Some(entry) = self.db.lock().data.relay_channels.get_mut(&(home_net.to_string(), home_chan.to_string())) {
            entry.chandesc = text;
        }
    }
}

impl Plugin for RelayEngine {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn on_load(&self, world: &World) {
        world.permissions.register_defaults("relay", "$ircop", vec!["relay.*".to_string()]);
    }

    fn on_unload(&self, world: &World) {
        world.permissions.remove_defaults("relay");
    }
}
