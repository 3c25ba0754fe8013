//! The reconnect loop driving one network's lifecycle (spec §5). Grounded
//! in the teacher's `sync::network::connect_to_peer`, but replacing its
//! flat 5-second retry with real exponential back-off, and folding the
//! outbound send-queue (spec §4.3: per-line spacing, PONG coalescing, a
//! max length whose overflow drops the connection) directly into the
//! per-connection select loop instead of a separate writer task, since
//! `NetworkState` must stay owned by this one task.

use super::connection::{self, NetworkStream};
use super::{ChannelQuery, LifecycleState, NetworkCommand, NetworkConfig, NetworkMeta, UserQuery};
use crate::hooks::HookBus;
use crate::protocols::{ProtocolAdapter, RegisterParams};
use crate::state::NetworkState;
use crate::wire::RawMessage;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{info, warn};

/// Spacing between consecutive user-sourced lines on the outbound queue
/// (spec §4.3's default of 0.005s); server/control frames have none.
const USER_LINE_SPACING: Duration = Duration::from_millis(5);

fn set_state(flag: &AtomicU8, state: LifecycleState) {
    flag.store(state as u8, Ordering::Release);
}

fn is_user_line(msg: &RawMessage) -> bool {
    matches!(msg.command.as_str(), "PRIVMSG" | "NOTICE")
}

/// Pushes `msg` onto the outbound queue, coalescing consecutive PONGs and
/// refusing once `limit` is reached (spec §4.3).
fn enqueue(queue: &mut VecDeque<RawMessage>, msg: RawMessage, limit: usize) -> std::result::Result<(), ()> {
    if msg.command == "PONG" {
        if let Some(last) = queue.back_mut() {
            if last.command == "PONG" {
                *last = msg;
                return Ok(());
            }
        }
    }
    if queue.len() >= limit {
        return Err(());
    }
    queue.push_back(msg);
    Ok(())
}

fn enqueue_all(queue: &mut VecDeque<RawMessage>, msgs: Vec<RawMessage>, limit: usize) -> std::result::Result<(), ()> {
    for msg in msgs {
        enqueue(queue, msg, limit)?;
    }
    Ok(())
}

/// Exponential back-off with decorrelated jitter, reset on every
/// successful reach of [`LifecycleState::Ready`]. Deliberately not the
/// teacher's flat 5-second retry.
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { attempt: 0 }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    /// `base_secs` is the network's configured `autoconnect`; the delay
    /// doubles per attempt up to a 32x cap, plus up to 1s of jitter.
    fn next_delay(&mut self, base_secs: i64) -> Duration {
        let base = base_secs.max(1) as u64;
        let shift = self.attempt.min(5);
        let scaled = base.saturating_mul(1u64 << shift).min(base.saturating_mul(32));
        self.attempt = self.attempt.saturating_add(1);
        let jitter_ms = rand::random::<u64>() % 1000;
        Duration::from_secs(scaled) + Duration::from_millis(jitter_ms)
    }
}

enum ConnectionOutcome {
    /// The peer closed, a read/write error occurred, or a ping timed out
    /// after the connection had at least started registering.
    Disconnected(String),
    /// A registration-phase failure the protocol marks unrecoverable
    /// (bad recvpass, K-LINE, YOUREBANNEDCREEP) — no retry (spec §5).
    FatalRegistrationFailure(String),
    /// `NetworkCommand::Shutdown` or the process-wide shutdown broadcast
    /// fired; the caller should stop reconnecting entirely.
    ShutdownRequested,
}

pub async fn run(
    config: NetworkConfig,
    hooks: Arc<HookBus>,
    mut cmd_rx: mpsc::UnboundedReceiver<NetworkCommand>,
    lifecycle: Arc<AtomicU8>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let adapter = config.protocol.build();
    let mut backoff = Backoff::new();

    loop {
        set_state(&lifecycle, LifecycleState::Connecting);
        info!(network = %config.name, host = %config.hostname, port = config.port, "connecting");

        let outcome = connect_and_run(&config, adapter.as_ref(), &hooks, &mut cmd_rx, &lifecycle, &mut shutdown_rx, &mut backoff).await;

        match outcome {
            ConnectionOutcome::ShutdownRequested => {
                set_state(&lifecycle, LifecycleState::Closing);
                info!(network = %config.name, "network shut down");
                return;
            }
            ConnectionOutcome::FatalRegistrationFailure(reason) => {
                warn!(network = %config.name, %reason, "registration failed fatally, giving up");
                set_state(&lifecycle, LifecycleState::Disconnected);
                return;
            }
            ConnectionOutcome::Disconnected(reason) => {
                set_state(&lifecycle, LifecycleState::Disconnected);
                info!(network = %config.name, %reason, "disconnected");

                if config.autoconnect <= 0 {
                    info!(network = %config.name, "autoconnect disabled, not retrying");
                    return;
                }

                let delay = backoff.next_delay(config.autoconnect);
                info!(network = %config.name, delay_ms = delay.as_millis() as u64, "reconnecting after back-off");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        set_state(&lifecycle, LifecycleState::Closing);
                        return;
                    }
                }
            }
        }
    }
}

async fn establish_stream(config: &NetworkConfig) -> crate::error::Result<NetworkStream> {
    let tcp = connection::connect_tcp(&config.hostname, config.port).await?;
    if config.tls {
        let tls = connection::upgrade_to_tls(tcp, &config.hostname, config.verify_cert, config.cert_fingerprint.as_deref()).await?;
        Ok(NetworkStream::Tls(Box::new(tls)))
    } else {
        Ok(NetworkStream::Plain(tcp))
    }
}

#[allow(clippy::too_many_arguments)]
async fn connect_and_run(
    config: &NetworkConfig,
    adapter: &dyn ProtocolAdapter,
    hooks: &Arc<HookBus>,
    cmd_rx: &mut mpsc::UnboundedReceiver<NetworkCommand>,
    lifecycle: &Arc<AtomicU8>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    backoff: &mut Backoff,
) -> ConnectionOutcome {
    let stream = match establish_stream(config).await {
        Ok(s) => s,
        Err(e) => return ConnectionOutcome::Disconnected(format!("connect failed: {e}")),
    };

    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(16384));
    let mut state = NetworkState::new(config.name.clone(), config.own_sid.clone(), adapter.capabilities());
    let mut outbound: VecDeque<RawMessage> = VecDeque::new();

    set_state(lifecycle, LifecycleState::Registering);
    let register_params = RegisterParams {
        own_sid: &config.own_sid,
        own_name: &config.name,
        description: &config.description,
        sendpass: config.sendpass.as_deref(),
        nick: &config.nick,
        ident: &config.ident,
        realname: &config.realname,
    };
    for line in adapter.register_lines(&register_params) {
        if framed.send(line.to_string()).await.is_err() {
            return ConnectionOutcome::Disconnected("write failed during registration".into());
        }
    }

    set_state(lifecycle, LifecycleState::Bursting);
    if enqueue_all(&mut outbound, adapter.send_burst(&state), config.outbound_queue_limit).is_err() {
        return ConnectionOutcome::Disconnected("outbound queue overflow during burst".into());
    }

    let mut last_activity = Instant::now();
    let mut next_send_ready = Instant::now();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(config.ping_freq));
    ping_interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                for line in adapter.squit(&config.own_sid, &config.own_sid, "shutting down") {
                    let _ = framed.send(line.to_string()).await;
                }
                let _ = framed.flush().await;
                return ConnectionOutcome::ShutdownRequested;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    None => return ConnectionOutcome::ShutdownRequested,
                    Some(NetworkCommand::Send(msg)) => {
                        if enqueue(&mut outbound, msg, config.outbound_queue_limit).is_err() {
                            return ConnectionOutcome::Disconnected("outbound queue overflow".into());
                        }
                    }
                    Some(NetworkCommand::WithState(op)) => {
                        let lines = op(&mut state, adapter);
                        if enqueue_all(&mut outbound, lines, config.outbound_queue_limit).is_err() {
                            return ConnectionOutcome::Disconnected("outbound queue overflow".into());
                        }
                    }
                    Some(NetworkCommand::Shutdown(reason)) => {
                        for line in adapter.squit(&config.own_sid, &config.own_sid, &reason) {
                            let _ = framed.send(line.to_string()).await;
                        }
                        let _ = framed.flush().await;
                        return ConnectionOutcome::ShutdownRequested;
                    }
                    Some(NetworkCommand::QueryUser(uid, reply)) => {
                        let answer = state.users.get(&uid).map(|u| UserQuery {
                            uid: u.uid.clone(),
                            nick: u.nick.clone(),
                            ident: u.ident.clone(),
                            host: u.host.clone(),
                            realhost: u.realhost.clone(),
                            ip: u.ip.map(|ip| ip.to_string()),
                            realname: u.realname.clone(),
                            opered: u.opered,
                            opertype: u.opertype.clone(),
                            services_account: u.services_account.clone(),
                            manipulatable: u.manipulatable,
                            server_sid: u.server_sid.clone(),
                            channel_ranks: state
                                .channels_iter()
                                .filter(|c| c.members.contains(&uid))
                                .map(|c| (c.name.clone(), c.ranks_of(&uid).into_iter().max()))
                                .collect(),
                        });
                        let _ = reply.send(answer);
                    }
                    Some(NetworkCommand::QueryChannel(name, reply)) => {
                        let answer = state.channel(&name).ok().map(|c| ChannelQuery {
                            ts: c.ts,
                            topic: c.topic.clone(),
                            modes: c.modes.iter().map(|(ch, arg)| (*ch, arg.clone())).collect(),
                            members: c.members.iter().map(|uid| (uid.clone(), c.ranks_of(uid))).collect(),
                        });
                        let _ = reply.send(answer);
                    }
                    Some(NetworkCommand::QueryMeta(reply)) => {
                        let prefix_chars = state.mode_table.prefix_symbols.keys().copied().collect();
                        let _ = reply.send(NetworkMeta { prefix_chars, own_sid: state.own_sid.clone() });
                    }
                    Some(NetworkCommand::SpawnClient(req, reply)) => {
                        let result = adapter.spawn_client(&mut state, req.as_params());
                        match result {
                            Ok((uid, lines)) => {
                                if enqueue_all(&mut outbound, lines, config.outbound_queue_limit).is_err() {
                                    return ConnectionOutcome::Disconnected("outbound queue overflow".into());
                                }
                                let _ = reply.send(Ok(uid));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                }
            }

            () = tokio::time::sleep_until(next_send_ready.into()), if !outbound.is_empty() => {
                if let Some(msg) = outbound.pop_front() {
                    let spacing = if is_user_line(&msg) { USER_LINE_SPACING } else { Duration::ZERO };
                    if framed.send(msg.to_string()).await.is_err() {
                        return ConnectionOutcome::Disconnected("write failed".into());
                    }
                    next_send_ready = Instant::now() + spacing;
                }
            }

            line = framed.next() => {
                match line {
                    None => return ConnectionOutcome::Disconnected("connection closed by peer".into()),
                    Some(Err(e)) => return ConnectionOutcome::Disconnected(format!("read error: {e}")),
                    Some(Ok(raw)) => {
                        last_activity = Instant::now();
                        let Some(msg) = RawMessage::parse(&raw) else { continue };

                        if msg.command == "PING" {
                            let pong = adapter.pong(&config.own_sid, msg.arg(0));
                            let _ = enqueue_all(&mut outbound, pong, config.outbound_queue_limit);
                        }

                        let was_bursting = lifecycle.load(Ordering::Acquire) == LifecycleState::Bursting as u8;
                        let was_registering = lifecycle.load(Ordering::Acquire) == LifecycleState::Registering as u8;

                        if let Err(e) = adapter.handle_line(&mut state, hooks, &msg) {
                            if e.is_fatal_to_connection() {
                                if was_registering || was_bursting {
                                    return ConnectionOutcome::FatalRegistrationFailure(e.to_string());
                                }
                                return ConnectionOutcome::Disconnected(e.to_string());
                            }
                            warn!(network = %config.name, error = %e, command = %msg.command, "non-fatal protocol error");
                        }

                        if was_bursting && adapter.is_end_of_burst(&msg) {
                            set_state(lifecycle, LifecycleState::Ready);
                            backoff.reset();
                            info!(network = %config.name, "burst complete, network ready");
                        }
                    }
                }
            }

            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(config.ping_timeout) {
                    return ConnectionOutcome::Disconnected("ping timeout".into());
                }
                let ping = adapter.ping(&config.own_sid, None);
                let _ = enqueue_all(&mut outbound, ping, config.outbound_queue_limit);
            }
        }
    }
}
