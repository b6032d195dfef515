use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use watchfolder_core::types::{CycleContext, CycleId};
use watchfolder_core::Config;
use watchfolder_sync::pipeline::run_cycle;
use watchfolder_sync::{CycleReport, CycleSettings, Uploader};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::LogFile;
use crate::paths::{log_path, logs_dir, socket_path, LOG_ROTATION_PERIOD};
use crate::protocol::{DaemonRequest, DaemonResponse, CMD_STATUS, CMD_STOP, CMD_SYNC};

/// Whether a cycle is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    Running,
}

/// Outcome of one cycle as reported over the socket.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: CycleId,
    /// `timer` or `socket`.
    pub source: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CycleReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleSummary {
    fn new(cycle: &CycleContext, source: &str, result: Result<CycleReport, String>) -> Self {
        let (report, error) = match result {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            cycle_id: cycle.id,
            source: source.to_string(),
            started_at: cycle.started_at,
            report,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Issues cycle ids and remembers how cycles went.
#[derive(Debug, Default)]
struct CycleLedger {
    last_id: u64,
    state: CycleState,
    completed: u64,
    failed: u64,
    last: Option<CycleSummary>,
}

impl CycleLedger {
    fn begin(&mut self) -> CycleContext {
        self.last_id += 1;
        self.state = CycleState::Running;
        CycleContext::new(CycleId(self.last_id))
    }

    fn finish(&mut self, summary: CycleSummary) {
        self.state = CycleState::Idle;
        if summary.is_success() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.last = Some(summary);
    }
}

/// State shared by every daemon task.
struct DaemonShared {
    home: PathBuf,
    settings: CycleSettings,
    poll_interval: Duration,
    started_at: DateTime<Utc>,
    ledger: RwLock<CycleLedger>,
}

struct CycleJob {
    source: &'static str,
    respond_to: oneshot::Sender<CycleSummary>,
}

/// Start the daemon runtime and block the current thread until it exits.
///
/// `config` must already be validated.
pub fn start_blocking(
    home: &Path,
    config: Config,
    uploader: Arc<dyn Uploader>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(&config.logging.level, &log_path(home));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config, uploader))
}

/// Run the daemon until `stop`, ctrl-c or SIGTERM.
pub async fn run(
    home: PathBuf,
    config: Config,
    uploader: Arc<dyn Uploader>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let shared = Arc::new(DaemonShared {
        settings: CycleSettings::from_config(&config),
        poll_interval: config.poll_interval(),
        started_at: Utc::now(),
        ledger: RwLock::new(CycleLedger::default()),
        home,
    });
    tracing::info!(
        watch_folder = %shared.settings.watch_folder.display(),
        state_path = %shared.settings.state_path.display(),
        poll_interval_ms = config.poll_interval_ms,
        "daemon starting",
    );

    let (job_tx, job_rx) = mpsc::channel::<CycleJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = cycle_processor_task(shared, uploader, job_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let ticker_handle = {
        let shutdown = shutdown_tx.clone();
        let period = shared.poll_interval;
        let job_tx = job_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = ticker_task(period, job_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result =
                socket_server_task(shared, job_tx, shutdown.clone(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = shared.home.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { signal_task(shutdown, shutdown_rx).await })
    };

    let (processor_result, ticker_result, socket_result, rotation_result, signal_result) = tokio::join!(
        processor_handle,
        ticker_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("cycle_processor", processor_result)?;
    handle_join("ticker", ticker_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Sole consumer of cycle jobs, so at most one cycle is ever in flight.
///
/// Shutdown is only observed between jobs; an in-flight cycle always runs to
/// completion.
async fn cycle_processor_task(
    shared: Arc<DaemonShared>,
    uploader: Arc<dyn Uploader>,
    mut job_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let summary = run_one_cycle(&shared, uploader.clone(), job.source).await;
                let _ = job.respond_to.send(summary);
            }
        }
    }
    Ok(())
}

async fn run_one_cycle(
    shared: &DaemonShared,
    uploader: Arc<dyn Uploader>,
    source: &'static str,
) -> CycleSummary {
    let cycle = shared.ledger.write().await.begin();
    tracing::debug!(cycle = %cycle.id, source, "cycle started");

    let settings = shared.settings.clone();
    let result = tokio::task::spawn_blocking(move || {
        run_cycle(&cycle, &settings, uploader.as_ref()).map_err(|err| err.to_string())
    })
    .await
    .unwrap_or_else(|err| Err(format!("cycle task join error: {err}")));

    if let Err(err) = &result {
        tracing::error!(cycle = %cycle.id, source, error = %err, "cycle aborted");
    }

    let summary = CycleSummary::new(&cycle, source, result);
    shared.ledger.write().await.finish(summary.clone());
    summary
}

/// First tick one period after start; a long cycle pushes the schedule back
/// instead of producing a burst of catch-up ticks.
fn cycle_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn ticker_task(
    period: Duration,
    job_tx: mpsc::Sender<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = cycle_interval(period);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match enqueue_cycle(&job_tx, "timer").await {
                    Ok(_) => {}
                    Err(DaemonError::ChannelClosed(_)) => break,
                    Err(err) => tracing::error!(error = %err, "scheduled cycle failed"),
                }
            }
        }
    }
    Ok(())
}

async fn enqueue_cycle(
    job_tx: &mpsc::Sender<CycleJob>,
    source: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(CycleJob {
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    rx.await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))
}

async fn socket_server_task(
    shared: Arc<DaemonShared>,
    job_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "control socket accept failed");
                        continue;
                    }
                };
                let shared = shared.clone();
                let job_tx = job_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, shared, job_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    shared: Arc<DaemonShared>,
    job_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            CMD_STATUS => DaemonResponse::ok(build_status_payload(&shared).await),
            CMD_SYNC => match enqueue_cycle(&job_tx, "socket").await {
                Ok(summary) if summary.is_success() => DaemonResponse::ok(json!(summary)),
                Ok(summary) => DaemonResponse::error(
                    summary
                        .error
                        .unwrap_or_else(|| "cycle failed".to_string()),
                ),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            CMD_STOP => {
                tracing::info!("stop requested over control socket");
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(shared: &DaemonShared) -> Value {
    let (state, last_id, completed, failed, last) = {
        let ledger = shared.ledger.read().await;
        (
            ledger.state,
            ledger.last_id,
            ledger.completed,
            ledger.failed,
            ledger.last.clone(),
        )
    };

    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": shared.started_at,
        "state": state,
        "cycles_started": last_id,
        "cycles_completed": completed,
        "cycles_failed": failed,
        "last_cycle": last,
        "poll_interval_ms": shared.poll_interval.as_millis() as u64,
        "watch_folder": shared.settings.watch_folder.display().to_string(),
        "state_path": shared.settings.state_path.display().to_string(),
        "socket": socket_path(&shared.home).display().to_string(),
        "log": log_path(&shared.home).display().to_string(),
    })
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(LOG_ROTATION_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // Failures are logged inside rotate_logs.
                let _ = tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await;
            }
        }
    }
    Ok(())
}

async fn signal_task(
    shutdown: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;

    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
            let _ = shutdown.send(());
            Ok(())
        }
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down daemon");
                let _ = shutdown.send(());
                Ok(())
            }
            Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
        },
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Log to `log_file` and stderr. `RUST_LOG` overrides `level`.
fn init_tracing(level: &str, log_file: &Path) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(LogFile::new(log_file)),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
