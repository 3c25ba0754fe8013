//! The process-wide registry (spec §9, SPEC_FULL §4.0): the one piece of
//! shared state every network, the Relay engine, and every service bot
//! reaches through. Grounded in the teacher's `sync::manager`-style
//! "shared registry behind a concurrent map" shape, but narrowed to hold
//! only the process-wide singletons — per-network state itself stays
//! single-task-owned (`src/network/mod.rs`'s doc comment), reached only via
//! the `Arc<NetworkHandle>`s this registry hands out.

use crate::hooks::HookBus;
use crate::permissions::Permissions;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

use crate::network::NetworkHandle;
use crate::relay::RelayEngine;
use crate::services::ServiceBot;

/// A process-wide component with a load/unload lifecycle (spec §4.6: "a
/// plugin registers default permission grants on load, removes them on
/// unload"). The Relay engine is the one built-in implementor; external
/// plugins beyond Relay are out of scope here but this is the seam they'd
/// hang off of.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_load(&self, world: &World);
    fn on_unload(&self, world: &World);
}

/// Process-wide registry: `networks`, `plugins`, `services`, `permissions`
/// (spec §9's `world.*` accessors), plus the shutdown broadcast every
/// network task and the Relay/services runtimes listen on.
pub struct World {
    pub networks: DashMap<String, Arc<NetworkHandle>>,
    pub plugins: DashMap<&'static str, Arc<dyn Plugin>>,
    pub services: DashMap<String, Arc<ServiceBot>>,
    pub permissions: Permissions,
    pub hooks: Arc<HookBus>,
    relay: OnceLock<Arc<RelayEngine>>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

impl World {
    pub fn new(hooks: Arc<HookBus>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            networks: DashMap::new(),
            plugins: DashMap::new(),
            services: DashMap::new(),
            permissions: Permissions::new(),
            hooks,
            relay: OnceLock::new(),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn shutdown_subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// `world.networks` enumeration uses this (spec §5: "a read lock for
    /// enumeration, a write lock for (un)registration" — `DashMap` gives us
    /// both implicitly per-shard).
    pub fn network(&self, name: &str) -> Option<Arc<NetworkHandle>> {
        self.networks.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn register_network(&self, name: impl Into<String>, handle: NetworkHandle) -> Arc<NetworkHandle> {
        let handle = Arc::new(handle);
        self.networks.insert(name.into(), Arc::clone(&handle));
        handle
    }

    /// Removes and hard-aborts a network's task — used only when REHASH's
    /// config diff drops a network entirely (spec §5); a running network
    /// whose config merely changed is left alone.
    pub fn unregister_network(&self, name: &str) {
        if let Some((_, handle)) = self.networks.remove(name) {
            handle.abort();
        }
    }

    pub fn register_plugin(self: &Arc<Self>, plugin: Arc<dyn Plugin>) {
        plugin.on_load(self);
        self.plugins.insert(plugin.name(), plugin);
    }

    pub fn unregister_plugin(&self, name: &str) {
        if let Some((_, plugin)) = self.plugins.remove(name) {
            plugin.on_unload(self);
        }
    }

    pub fn register_service(&self, bot: Arc<ServiceBot>) {
        self.services.insert(bot.name.clone(), bot);
    }

    pub fn service(&self, name: &str) -> Option<Arc<ServiceBot>> {
        self.services.get(name).map(|e| Arc::clone(e.value()))
    }

    /// The Relay engine is set exactly once at startup (it needs an
    /// `Arc<World>` to construct, so it can't be built inside `World::new`
    /// itself) and is reachable everywhere after via [`World::relay`].
    pub fn set_relay(&self, relay: Arc<RelayEngine>) {
        let _ = self.relay.set(relay);
    }

    pub fn relay(&self) -> Option<Arc<RelayEngine>> {
        self.relay.get().cloned()
    }

    /// SHUTDOWN (spec §5): `die()` every plugin, broadcast shutdown to every
    /// network task (each SQUITs and flushes with its own bounded grace
    /// period in `event_loop::run`), and mark the process as exiting.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in self.plugins.iter() {
            entry.value().on_unload(self);
        }
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
