//! pylinkd - a pseudoservice IRC federation daemon.
//!
//! Speaks TS6, InspIRCd, UnrealIRCd, P10, and ngIRCd S2S protocols plus a
//! Clientbot fallback, relaying channels across linked networks via puppet
//! clones (spec §4.7).

mod casemap;
mod config;
mod error;
mod hooks;
mod modes;
mod network;
mod permissions;
mod protocols;
mod relay;
mod services;
mod state;
mod wire;
mod world;

use crate::config::Config;
use crate::relay::RelayEngine;
use crate::services::ServiceBot;
use crate::world::World;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};

const EXIT_CLEAN: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_STARTUP_FAILURE: u8 = 2;

/// Parsed command line (spec §6.5's fixed flag set). Manual parsing,
/// matching the teacher's `resolve_config_path` rather than pulling in an
/// argument-parsing crate for five flags.
struct Cli {
    config_path: String,
    daemon: bool,
    check_pid: bool,
    rehash: bool,
    shutdown: bool,
    restart: bool,
    version: bool,
    trace: bool,
}

impl Cli {
    fn parse() -> Self {
        let mut cli = Cli {
            config_path: "pylink.toml".to_string(),
            daemon: false,
            check_pid: true,
            rehash: false,
            shutdown: false,
            restart: false,
            version: false,
            trace: false,
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    cli.config_path = args.next().unwrap_or_else(|| {
                        eprintln!("Missing path after {arg}");
                        std::process::exit(EXIT_CONFIG_ERROR.into());
                    });
                }
                "--daemon" => cli.daemon = true,
                "--check-pid" => cli.check_pid = true,
                "--no-check-pid" => cli.check_pid = false,
                "--rehash" => cli.rehash = true,
                "--shutdown" => cli.shutdown = true,
                "--restart" => cli.restart = true,
                "--version" => cli.version = true,
                "--trace" => cli.trace = true,
                other => {
                    eprintln!("Unrecognized flag: {other}");
                    std::process::exit(EXIT_CONFIG_ERROR.into());
                }
            }
        }
        // Canonicalize so a later REHASH doesn't depend on the daemon's cwd.
        if let Ok(p) = std::fs::canonicalize(Path::new(&cli.config_path)) {
            cli.config_path = p.to_string_lossy().into_owned();
        }
        cli
    }
}

fn init_tracing(config: &Config, trace: bool) {
    let filter = if trace {
        tracing_subscriber::EnvFilter::new("trace")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.server.log_level.clone()))
    };
    match config.server.log_format {
        crate::config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
        }
        crate::config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Send `signal` to the PID recorded in `pid_file`, for `--rehash`/
/// `--shutdown`/`--restart` acting against an already-running instance.
/// Shells out to `kill`(1) rather than pulling in a libc binding for three
/// one-shot signal sends.
fn signal_running_instance(pid_file: &str, signal: &str) -> ExitCode {
    let pid = match std::fs::read_to_string(pid_file) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            eprintln!("Could not read pid file {pid_file}: {e}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    match std::process::Command::new("kill").arg(signal).arg(&pid).status() {
        Ok(status) if status.success() => ExitCode::from(EXIT_CLEAN),
        Ok(_) => {
            eprintln!("kill {signal} {pid} failed; is the daemon running?");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
        Err(e) => {
            eprintln!("Failed to invoke kill: {e}");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

/// Whether the pid recorded in `pid_file` is still alive (Linux-only, via
/// `/proc`), used by `--check-pid` to refuse a second concurrent start.
fn pid_file_holds_live_process(pid_file: &str) -> bool {
    let Ok(contents) = std::fs::read_to_string(pid_file) else { return false };
    let pid = contents.trim();
    if pid.is_empty() {
        return false;
    }
    Path::new(&format!("/proc/{pid}")).exists()
}

fn write_pid_file(pid_file: &str) -> std::io::Result<()> {
    std::fs::write(pid_file, std::process::id().to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("pylinkd {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::from(EXIT_CLEAN);
    }

    let config = match Config::load(&cli.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: Failed to load config from {}: {e}", cli.config_path);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(errors) = crate::config::validate(&config) {
        for err in &errors {
            eprintln!("Configuration error: {err}");
        }
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    if cli.rehash || cli.shutdown || cli.restart {
        let Some(pid_file) = config.server.pid_file.as_deref() else {
            eprintln!("server.pid_file is not configured; nothing to signal.");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        };
        let signal = if cli.rehash {
            "-HUP"
        } else if cli.shutdown {
            "-TERM"
        } else {
            "-TERM" // --restart: signal a clean shutdown; a supervisor restarts the process.
        };
        return signal_running_instance(pid_file, signal);
    }

    init_tracing(&config, cli.trace);

    if cli.daemon {
        warn!("--daemon was passed but this build runs foreground-only under its process supervisor; ignoring.");
    }

    if cli.check_pid {
        if let Some(pid_file) = config.server.pid_file.as_deref() {
            if pid_file_holds_live_process(pid_file) {
                error!(pid_file, "another instance appears to be running (use --no-check-pid to override)");
                return ExitCode::from(EXIT_STARTUP_FAILURE);
            }
        }
    }

    if config.server.pid_file_enabled {
        if let Some(pid_file) = config.server.pid_file.as_deref() {
            if let Err(e) = write_pid_file(pid_file) {
                error!(pid_file, error = %e, "failed to write pid file");
                return ExitCode::from(EXIT_STARTUP_FAILURE);
            }
        }
    }

    info!(server = %config.server.name, networks = config.networks.len(), "starting pylinkd");

    let hooks = std::sync::Arc::new(crate::hooks::HookBus::new());
    let world = World::new(hooks.clone());
    world.permissions.load_explicit(config.permissions.grants.clone());

    for (name, block) in &config.networks {
        let runtime_config = block.clone().into_runtime_config(name);
        let handle = crate::network::spawn(runtime_config, hooks.clone(), world.shutdown_subscribe());
        world.register_network(name.clone(), handle);
    }

    let relay_bot = ServiceBot::new("relay", "Relay", "relay", &config.server.name, "PyLink Relay");
    if let Err(e) = RelayEngine::install(world.clone(), relay_bot, &config.relay) {
        error!(error = %e, "failed to start relay engine");
        return ExitCode::from(EXIT_STARTUP_FAILURE);
    }

    let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGHUP handler");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let mut sigusr1 = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGUSR1 handler");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let config_path = cli.config_path.clone();
    let rehash_world = world.clone();
    let rehash_hooks = hooks.clone();
    let mut live_config = config;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                info!("received SIGHUP, rehashing");
                rehash(&config_path, &rehash_world, &rehash_hooks, &mut live_config).await;
            }
            _ = sigusr1.recv() => {
                info!("received SIGUSR1, rehashing");
                rehash(&config_path, &rehash_world, &rehash_hooks, &mut live_config).await;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                world.shutdown();
                break;
            }
        }
    }

    // Bounded grace period for networks to flush their SQUIT/QUIT writers.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    if let Some(pid_file) = live_config.server.pid_file.as_deref() {
        if live_config.server.pid_file_enabled {
            let _ = std::fs::remove_file(pid_file);
        }
    }

    info!("pylinkd stopped");
    ExitCode::from(EXIT_CLEAN)
}

/// REHASH (spec §5, §6.4): reload config/permissions in place, reconcile
/// the set of running networks against the new config, and leave `Ready`
/// connections alone even if their block changed.
async fn rehash(
    config_path: &str,
    world: &std::sync::Arc<World>,
    hooks: &std::sync::Arc<crate::hooks::HookBus>,
    live_config: &mut Config,
) {
    let new_config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "rehash: failed to load config, keeping previous config live");
            return;
        }
    };
    if let Err(errors) = crate::config::validate(&new_config) {
        for err in &errors {
            error!(error = %err, "rehash: validation failed, keeping previous config live");
        }
        return;
    }

    let diff = new_config.diff_networks(live_config);
    for name in &diff.removed {
        info!(network = name, "rehash: removing network");
        world.unregister_network(name);
    }
    for name in diff.added.iter().chain(diff.changed.iter()) {
        let Some(block) = new_config.networks.get(name) else { continue };
        if let Some(existing) = world.network(name) {
            if existing.is_ready() {
                info!(network = name, "rehash: config changed but connection is Ready, leaving it alone");
                continue;
            }
            world.unregister_network(name);
        }
        info!(network = name, "rehash: (re)connecting network");
        let runtime_config = block.clone().into_runtime_config(name);
        let handle = crate::network::spawn(runtime_config, hooks.clone(), world.shutdown_subscribe());
        world.register_network(name.clone(), handle);
    }

    world.permissions.load_explicit(new_config.permissions.grants.clone());
    *live_config = new_config;
    info!("rehash complete");
}
