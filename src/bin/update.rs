//! The update daemon entrypoint (`spec.md` §4.4): polls the coordination
//! channel for requests from the web daemon, runs periodic checks, applies
//! updates under the apply lock, and serves the update-progress SSE stream
//! on a localhost-only HTTP server.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use corvid_sentinel::config::{self, CorvidConfig};
use corvid_sentinel::update::{
    ApplyLock, DaemonSignalState, UpdateAction, UpdateChannel, UpdateContext, UpdateResult, UpdateStatus,
};

#[derive(Parser, Debug)]
#[command(name = "corvid-update")]
#[command(about = "Checks for and applies versioned self-upgrades, with crash-safe rollback")]
struct CliArgs {
    /// Path to config.yaml; falls back to $CORVID_CONFIG, then ./config.yaml.
    #[arg(long, env = "CORVID_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the database, config, update channel, lock, and state file.
    #[arg(long, env = "CORVID_DATA_DIR", default_value = "/var/lib/corvid-sentinel")]
    data_dir: PathBuf,

    /// Working copy of the application's own source (the repo this daemon updates).
    #[arg(long, env = "CORVID_REPO_DIR", default_value = ".")]
    repo_dir: PathBuf,

    /// `monitor` checks only and never applies; `both` checks and applies
    /// on request; `migrate` runs pending migrations once and exits.
    #[arg(long, value_enum, default_value = "both")]
    mode: Mode,

    /// Address the progress-stream HTTP server binds to. Spec requires
    /// localhost-only; not exposed via the reverse proxy like the web daemon.
    #[arg(long, env = "CORVID_UPDATE_BIND", default_value = "127.0.0.1:8081")]
    bind: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Monitor,
    Both,
    Migrate,
}

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    corvid_sentinel::telemetry::init("corvid-update");

    let args = CliArgs::parse();
    let loaded = CorvidConfig::load(args.config.as_deref())?;
    config::init(loaded);
    let cfg = config::get();

    let db_path = args.data_dir.join("corvid.db");
    let config_path = args.config.clone().unwrap_or_else(|| PathBuf::from("config.yaml"));

    if args.mode == Mode::Migrate {
        corvid_sentinel::store::run_migrations(&db_path).await?;
        tracing::info!("migrations complete");
        return Ok(());
    }

    let context = Arc::new(UpdateContext {
        data_dir: args.data_dir.clone(),
        repo_dir: args.repo_dir.clone(),
        db_path,
        config_path,
        git_remote: cfg.updates.git_remote.clone(),
        git_branch: cfg.updates.git_branch.clone(),
    });

    // §8 invariant 6: on startup, recover from any non-terminal phase left
    // behind by a prior process before serving a single request.
    context.recover_on_startup().await?;

    let channel = Arc::new(UpdateChannel::new(&args.data_dir));
    let signals = Arc::new(DaemonSignalState::new());

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_shutdown = shutdown.clone();
    let signal_state = signals.clone();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        signal_state.on_signal();
        if !signal_state.shutdown_requested() {
            return;
        }
        signal_shutdown.store(true, Ordering::Relaxed);
    })?;

    let http_data_dir = args.data_dir.clone();
    let http_channel = channel.clone();
    let bind_addr = args.bind.clone();
    let mode = args.mode;
    let server = tokio::spawn(async move {
        let app = corvid_sentinel::api::update_stream::router(http_channel, http_data_dir);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        tracing::info!(addr = %bind_addr, "corvid-update progress stream listening");
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    });

    let monitor = monitor_loop(context, channel, signals, shutdown.clone(), cfg.updates.clone(), mode);

    tokio::select! {
        result = monitor => result?,
        result = server => { result??; }
    }

    Ok(())
}

async fn monitor_loop(
    context: Arc<UpdateContext>,
    channel: Arc<UpdateChannel>,
    signals: Arc<DaemonSignalState>,
    shutdown: Arc<AtomicBool>,
    updates_cfg: corvid_sentinel::config::UpdatesConfig,
    mode: Mode,
) -> anyhow::Result<()> {
    let check_interval = Duration::from_secs(u64::from(updates_cfg.check_interval_hours) * 3600);
    let mut last_periodic_check = if updates_cfg.auto_check_on_startup {
        None
    } else {
        Some(std::time::Instant::now())
    };

    while !shutdown.load(Ordering::Relaxed) {
        if let Some(request) = channel.take_request()? {
            match request.action {
                UpdateAction::Check => {
                    run_check(&context, &channel).await;
                }
                UpdateAction::Apply => {
                    if mode == Mode::Monitor {
                        tracing::warn!("apply requested but daemon is running in monitor-only mode; ignoring");
                        channel.write_result(&UpdateResult {
                            success: false,
                            version: request.version.clone().unwrap_or_default(),
                            error: Some("daemon is running in monitor mode".to_string()),
                        })?;
                    } else {
                        run_apply(&context, &channel, &signals, request.version).await;
                    }
                }
            }
        }

        if updates_cfg.check_enabled {
            let due = match last_periodic_check {
                None => true,
                Some(at) => at.elapsed() >= check_interval,
            };
            if due {
                run_check(&context, &channel).await;
                last_periodic_check = Some(std::time::Instant::now());
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Ok(())
}

async fn run_check(context: &UpdateContext, channel: &UpdateChannel) {
    let current_version = match corvid_sentinel::update::current_commit(&context.repo_dir).await {
        Ok(commit) => commit,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read current commit for update check");
            return;
        }
    };

    match context.check().await {
        Ok(behind) => {
            let status = UpdateStatus {
                current_version,
                latest_version: if behind.behind > 0 {
                    Some(format!("{}/{}", context.git_remote, context.git_branch))
                } else {
                    None
                },
                available: behind.behind > 0,
                checked_at: chrono::Utc::now(),
            };
            if let Err(e) = channel.write_status(&status) {
                tracing::warn!(error = %e, "failed to write update status");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "update check failed");
        }
    }
}

async fn run_apply(
    context: &UpdateContext,
    channel: &UpdateChannel,
    signals: &DaemonSignalState,
    version: Option<String>,
) {
    let target = version.unwrap_or_else(|| format!("{}/{}", context.git_remote, context.git_branch));

    let mut lock = match ApplyLock::acquire(&context.data_dir) {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!(error = %e, "could not acquire apply lock, skipping apply");
            let _ = channel.write_result(&UpdateResult {
                success: false,
                version: target,
                error: Some(e.to_string()),
            });
            return;
        }
    };

    let result = context.apply(&target, signals).await;
    lock.release();

    let outcome = match result {
        Ok(()) => UpdateResult {
            success: true,
            version: target,
            error: None,
        },
        Err(e) => UpdateResult {
            success: false,
            version: target,
            error: Some(e.to_string()),
        },
    };

    if let Err(e) = channel.write_result(&outcome) {
        tracing::warn!(error = %e, "failed to write update result");
    }
}
