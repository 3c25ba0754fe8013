//! The network driver (spec §4.1, §5): owns one uplink's TCP/TLS socket,
//! line reader, outbound queue, ping/keepalive, and reconnect loop, and
//! drives the per-connection lifecycle state machine. Grounded in the
//! teacher daemon's `sync::network::connect_to_peer`, adapted so
//! `NetworkState` is owned by a single task rather than shared behind a
//! lock — only UID/SID/channel-name strings cross a network's boundary,
//! via [`NetworkCommand::WithState`] closures run on that task.

pub mod connection;
pub mod event_loop;

use crate::error::Result;
use crate::hooks::HookBus;
use crate::modes::PrefixRank;
use crate::protocols::{ProtocolAdapter, ProtocolFamily};
use crate::state::NetworkState;
use crate::wire::RawMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// A connection's state-machine position (spec §5's
/// "Disconnected → Connecting → Registering → Bursting → Ready → Closing").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Disconnected = 0,
    Connecting = 1,
    Registering = 2,
    Bursting = 3,
    Ready = 4,
    Closing = 5,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Registering,
            3 => Self::Bursting,
            4 => Self::Ready,
            5 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

/// One network's static configuration, owned by the not-yet-built
/// `config` module and handed to [`spawn`] verbatim.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub protocol: ProtocolFamily,
    pub hostname: String,
    pub port: u16,
    pub tls: bool,
    pub verify_cert: bool,
    pub cert_fingerprint: Option<String>,
    pub sendpass: Option<String>,
    pub recvpass: Option<String>,
    pub own_sid: String,
    pub description: String,
    pub nick: String,
    pub ident: String,
    pub realname: String,
    /// Reconnect delay in seconds; `<= 0` disables automatic reconnect
    /// (spec §5: "disabled when ≤ 0").
    pub autoconnect: i64,
    pub ping_freq: u64,
    pub ping_timeout: u64,
    /// Max buffered outbound lines before the connection is hard-closed
    /// (spec §4.3's send-queue "enforces a configurable max queue length;
    /// overflow drops the connection").
    pub outbound_queue_limit: usize,
}

impl NetworkConfig {
    /// Default `ping_freq`/`ping_timeout`/`outbound_queue_limit` per spec §5.
    pub const DEFAULT_PING_FREQ: u64 = 90;
    pub const DEFAULT_PING_TIMEOUT: u64 = 180;
    pub const DEFAULT_OUTBOUND_QUEUE_LIMIT: usize = 4096;
}

/// A closure run with exclusive access to a live network's state, returning
/// whatever outbound lines the operation produces. Keeps `NetworkState`
/// single-task-owned while letting plugins and the Relay engine act on it.
pub type StateOp = Box<dyn FnOnce(&mut NetworkState, &dyn ProtocolAdapter) -> Vec<RawMessage> + Send>;

/// A read-only snapshot of one user plus the prefix rank they hold in every
/// channel they're in, handed back across [`NetworkHandle::query_user`].
/// Relay and the permissions/service layers live outside the owning task, so
/// this is the one place they read live user state rather than touching
/// `NetworkState` directly (spec §5: `NetworkState` is never `Send`-shared).
#[derive(Debug, Clone)]
pub struct UserQuery {
    pub uid: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realhost: String,
    pub ip: Option<String>,
    pub realname: String,
    pub opered: bool,
    pub opertype: Option<String>,
    pub services_account: Option<String>,
    pub manipulatable: bool,
    pub server_sid: String,
    /// channel name -> highest prefix rank held there, for every channel
    /// this user currently occupies.
    pub channel_ranks: HashMap<String, Option<PrefixRank>>,
}

/// A read-only snapshot of one channel, for Relay's initial LINK sync.
#[derive(Debug, Clone)]
pub struct ChannelQuery {
    pub ts: i64,
    pub topic: Option<String>,
    pub modes: Vec<(char, Option<String>)>,
    /// (uid, ranks held) for every current member.
    pub members: Vec<(String, Vec<PrefixRank>)>,
}

/// A small per-network fact sheet Relay caches once per uplink rather than
/// re-querying on every mode change: which mode characters are prefix modes,
/// needed to single out prefix-mode changes for CLAIM/LINKACL reversal
/// (spec §4.7) without duplicating the whole `ModeTable` outside its task.
#[derive(Debug, Clone, Default)]
pub struct NetworkMeta {
    pub prefix_chars: std::collections::HashSet<char>,
    pub own_sid: String,
}

/// An owned (non-borrowing) version of [`crate::protocols::SpawnClient`],
/// needed because a [`NetworkCommand`] crosses an `'static` channel
/// boundary and so can't carry borrowed `&str` fields.
#[derive(Debug, Clone)]
pub struct OwnedSpawnClient {
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realhost: String,
    pub modes: Vec<crate::modes::ParsedMode>,
    pub server: String,
    pub ip: Option<String>,
    pub realname: String,
    pub ts: i64,
    pub opertype: Option<String>,
    pub manipulatable: bool,
}

impl OwnedSpawnClient {
    pub fn as_params(&self) -> crate::protocols::SpawnClient<'_> {
        crate::protocols::SpawnClient {
            nick: &self.nick,
            ident: &self.ident,
            host: &self.host,
            realhost: &self.realhost,
            modes: &self.modes,
            server: &self.server,
            ip: self.ip.as_deref(),
            realname: &self.realname,
            ts: self.ts,
            opertype: self.opertype.as_deref(),
            manipulatable: self.manipulatable,
        }
    }
}

/// Instructions accepted by a running network's event loop.
pub enum NetworkCommand {
    /// Queue a raw line for the outbound writer, bypassing state mutation.
    Send(RawMessage),
    /// Run `op` against the live `NetworkState`/adapter and queue whatever
    /// it returns.
    WithState(StateOp),
    /// Close the connection (SQUIT/QUIT per protocol, then flush) and stop
    /// reconnecting; `reason` is logged and, where the protocol supports
    /// it, sent as the disconnect reason.
    Shutdown(String),
    /// Read-only user snapshot, answered from the owning task.
    QueryUser(String, oneshot::Sender<Option<UserQuery>>),
    /// Read-only channel snapshot, answered from the owning task.
    QueryChannel(String, oneshot::Sender<Option<ChannelQuery>>),
    /// Per-network mode-table fact sheet, answered from the owning task.
    QueryMeta(oneshot::Sender<NetworkMeta>),
    /// Spawn a client and hand back its freshly allocated UID; unlike
    /// `WithState`, the caller needs this value back to record it (e.g. in
    /// the Relay DB's `relay_users` map), so it round-trips a reply.
    SpawnClient(Box<OwnedSpawnClient>, oneshot::Sender<Result<String>>),
}

/// A handle to a running network task (spec §4.1's `NetworkHandle`).
pub struct NetworkHandle {
    pub name: String,
    cmd_tx: mpsc::UnboundedSender<NetworkCommand>,
    lifecycle: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl NetworkHandle {
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == LifecycleState::Ready
    }

    /// Queue a raw line for this network's outbound writer. Silently
    /// dropped if the task has already exited.
    pub fn send(&self, line: RawMessage) {
        let _ = self.cmd_tx.send(NetworkCommand::Send(line));
    }

    /// Run `op` against this network's live state from its own task.
    pub fn with_state(&self, op: StateOp) {
        let _ = self.cmd_tx.send(NetworkCommand::WithState(op));
    }

    pub fn shutdown(&self, reason: impl Into<String>) {
        let _ = self.cmd_tx.send(NetworkCommand::Shutdown(reason.into()));
    }

    /// Async round-trip read of one user's state. Returns `None` if the user
    /// doesn't exist or the network task has already exited.
    pub async fn query_user(&self, uid: &str) -> Option<UserQuery> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(NetworkCommand::QueryUser(uid.to_string(), tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Async round-trip read of one channel's state. Returns `None` if the
    /// channel doesn't exist or the network task has already exited.
    pub async fn query_channel(&self, channel: &str) -> Option<ChannelQuery> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(NetworkCommand::QueryChannel(channel.to_string(), tx)).ok()?;
        rx.await.ok().flatten()
    }

    /// Async round-trip read of this network's mode-table fact sheet.
    pub async fn query_meta(&self) -> Option<NetworkMeta> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(NetworkCommand::QueryMeta(tx)).ok()?;
        rx.await.ok()
    }

    /// Spawn a client on this network and wait for its allocated UID.
    pub async fn spawn_client(&self, req: OwnedSpawnClient) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(NetworkCommand::SpawnClient(Box::new(req), tx)).is_err() {
            return Err(crate::error::PylinkError::NotFound(format!("network {} is gone", self.name)));
        }
        rx.await.map_err(|_| crate::error::PylinkError::NotFound(format!("network {} dropped the reply", self.name)))?
    }

    /// Aborts the task immediately. Used only when the REHASH diff removes
    /// this network's config entirely (spec §5); a graceful
    /// [`Self::shutdown`] is always preferred otherwise.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Spawns the reconnect-loop task for one network and returns a handle to
/// it. `shutdown_rx` is the process-wide shutdown broadcast (spec §5's
/// SHUTDOWN/SIGTERM handling); the task exits its reconnect loop for good
/// once it fires.
pub fn spawn(config: NetworkConfig, hooks: Arc<HookBus>, shutdown_rx: broadcast::Receiver<()>) -> NetworkHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let lifecycle = Arc::new(AtomicU8::new(LifecycleState::Disconnected as u8));
    let name = config.name.clone();

    let task_lifecycle = Arc::clone(&lifecycle);
    let task = tokio::spawn(async move {
        event_loop::run(config, hooks, cmd_rx, task_lifecycle, shutdown_rx).await;
    });

    NetworkHandle { name, cmd_tx, lifecycle, task }
}
