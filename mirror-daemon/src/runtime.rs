use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mirror_core::{config, SyncProfile};
use mirror_sync::{
    pipeline::{self, SyncScope},
    staleness, state, SyncOptions, SyncOutcome, SyncReport,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, socket_path, stderr_log_path, stdout_log_path};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::schedule::{due_profiles, next_wakeup};

/// Upper bound on scheduler sleeps, so config edits are picked up.
const RELOAD_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SyncTarget {
    All,
    Profile(String),
}

impl SyncTarget {
    fn scope(&self) -> SyncScope {
        match self {
            SyncTarget::All => SyncScope::All,
            SyncTarget::Profile(name) => SyncScope::Profile(name.clone()),
        }
    }

    fn label(&self) -> String {
        match self {
            SyncTarget::All => "all".to_string(),
            SyncTarget::Profile(name) => name.clone(),
        }
    }
}

struct SyncJob {
    target: SyncTarget,
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub target: String,
    pub source: String,
    pub reports: Vec<SyncReport>,
    pub updated: usize,
    pub unchanged: usize,
    pub duration_ms: u128,
}

/// Most recent run processed by this daemon.
#[derive(Debug, Clone, Serialize)]
struct LastRun {
    target: String,
    source: String,
    finished_at: DateTime<Utc>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// State shared by the daemon tasks.
#[derive(Clone)]
struct DaemonState {
    home: PathBuf,
    started_at: DateTime<Utc>,
    sync_tx: mpsc::Sender<SyncJob>,
    /// Targets waiting in the queue; a target is never queued twice.
    queued: Arc<Mutex<HashSet<SyncTarget>>>,
    last_run: Arc<RwLock<Option<LastRun>>>,
}

impl DaemonState {
    fn new(home: PathBuf, sync_tx: mpsc::Sender<SyncJob>) -> Self {
        Self {
            home,
            started_at: Utc::now(),
            sync_tx,
            queued: Arc::new(Mutex::new(HashSet::new())),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue `target`; the receiver resolves once the run finishes.
    async fn enqueue(
        &self,
        target: SyncTarget,
        source: &'static str,
    ) -> Result<oneshot::Receiver<Result<SyncSummary, String>>, DaemonError> {
        if !self.queued.lock().await.insert(target.clone()) {
            return Err(DaemonError::AlreadyQueued {
                target: target.label(),
            });
        }
        let (tx, rx) = oneshot::channel();
        let job = SyncJob {
            target: target.clone(),
            source,
            respond_to: tx,
        };
        if self.sync_tx.send(job).await.is_err() {
            self.queued.lock().await.remove(&target);
            return Err(DaemonError::ChannelClosed("sync queue"));
        }
        Ok(rx)
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(Some(home));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon until `stop` or ctrl-c.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    tracing::info!(home = %home.display(), "daemon starting");

    let (jobs_tx, jobs_rx) = mpsc::channel::<SyncJob>(64);
    let (stop_tx, _) = broadcast::channel::<()>(16);
    let state = DaemonState::new(home.clone(), jobs_tx);

    // Every receiver exists before the first task can send.
    let scheduler = scheduler_task(state.clone(), stop_tx.subscribe());
    let processor = sync_processor_task(state.clone(), jobs_rx, stop_tx.subscribe());
    let control = socket_server_task(state.clone(), stop_tx.clone(), stop_tx.subscribe());
    let rotation = log_rotation_task(home.clone(), stop_tx.subscribe());
    let ctrl_c = wait_for_ctrl_c(stop_tx.clone(), stop_tx.subscribe());

    let tasks = vec![
        supervise("scheduler", &stop_tx, scheduler),
        supervise("sync processor", &stop_tx, processor),
        supervise("control socket", &stop_tx, control),
        supervise("log rotation", &stop_tx, rotation),
        supervise("ctrl-c", &stop_tx, ctrl_c),
    ];

    // Wait for every task before reporting the first failure.
    let mut first_error = None;
    for (name, handle) in tasks {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(join) => Err(DaemonError::Protocol(format!("{name} task panicked: {join}"))),
        };
        if let Err(err) = outcome {
            tracing::error!(task = name, error = %err, "daemon task failed");
            first_error.get_or_insert(err);
        }
    }
    tracing::info!("daemon stopped");
    first_error.map_or(Ok(()), Err)
}

type TaskHandle = (&'static str, JoinHandle<Result<(), DaemonError>>);

/// Spawn `task`; when it ends, for any reason, the others are told to stop.
fn supervise<F>(name: &'static str, stop_tx: &broadcast::Sender<()>, task: F) -> TaskHandle
where
    F: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    let stop_tx = stop_tx.clone();
    let handle = tokio::spawn(async move {
        let result = task.await;
        let _ = stop_tx.send(());
        result
    });
    (name, handle)
}

async fn wait_for_ctrl_c(
    stop_tx: broadcast::Sender<()>,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    tokio::select! {
        _ = stop_rx.recv() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_err("ctrl-c handler", err))?;
            tracing::info!("ctrl-c received, stopping");
            let _ = stop_tx.send(());
            Ok(())
        }
    }
}

async fn scheduler_task(
    state: DaemonState,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut checked_until = Utc::now();
    loop {
        let profiles = load_profiles(&state.home).await;
        let wait = match next_wakeup(&profiles, checked_until) {
            Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => RELOAD_INTERVAL,
        }
        .min(RELOAD_INTERVAL);

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Utc::now();
        let profiles = load_profiles(&state.home).await;
        for name in due_profiles(&profiles, checked_until, now) {
            // Fire and forget; the processor logs the outcome.
            match state
                .enqueue(SyncTarget::Profile(name.clone()), "schedule")
                .await
            {
                Ok(_) => tracing::info!(profile = %name, "scheduled sync queued"),
                Err(DaemonError::AlreadyQueued { .. }) => {
                    tracing::info!(profile = %name, "scheduled sync skipped, already queued")
                }
                Err(err) => return Err(err),
            }
        }
        checked_until = now;
    }
    Ok(())
}

async fn sync_processor_task(
    state: DaemonState,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                state.queued.lock().await.remove(&job.target);
                let started = Instant::now();

                let scope = job.target.scope();
                let home = state.home.clone();
                let sync_result = tokio::task::spawn_blocking(move || {
                    pipeline::run(&home, scope, SyncOptions::default())
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;

                let outcome = match sync_result {
                    Ok(reports) => {
                        let summary =
                            build_sync_summary(&job.target, job.source, reports, started.elapsed());
                        tracing::info!(
                            sync_target = %summary.target,
                            source = %summary.source,
                            updated = summary.updated,
                            unchanged = summary.unchanged,
                            duration_ms = summary.duration_ms,
                            "sync completed",
                        );
                        Ok(summary)
                    }
                    Err(err) => {
                        tracing::error!(
                            sync_target = %job.target.label(),
                            source = job.source,
                            error = %err,
                            "sync failed",
                        );
                        Err(err.to_string())
                    }
                };

                *state.last_run.write().await = Some(LastRun {
                    target: job.target.label(),
                    source: job.source.to_string(),
                    finished_at: Utc::now(),
                    ok: outcome.is_ok(),
                    error: outcome.as_ref().err().cloned(),
                });
                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    state: DaemonState,
    stop_tx: broadcast::Sender<()>,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let stop_tx = stop_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_client(stream, state, stop_tx).await {
                        tracing::warn!(error = %err, "control client dropped");
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

/// Serve one connection: a request per line, a response per line.
async fn serve_client(
    stream: UnixStream,
    state: DaemonState,
    stop_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| io_err("control socket read", e))?;
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let (response, stop) = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => dispatch(&state, request).await,
            Err(err) => (DaemonResponse::error(format!("malformed request: {err}")), false),
        };
        write_response(&mut writer, &response).await?;
        if stop {
            let _ = stop_tx.send(());
            break;
        }
    }
    Ok(())
}

/// Answer one request; the flag asks the caller to stop the daemon.
async fn dispatch(state: &DaemonState, request: DaemonRequest) -> (DaemonResponse, bool) {
    let response = match request.cmd.as_str() {
        "status" => build_status_payload(state).await.map(DaemonResponse::ok),
        "sync" => {
            let target = request
                .profile
                .map_or(SyncTarget::All, SyncTarget::Profile);
            queue_and_wait(state, target)
                .await
                .map(|summary| DaemonResponse::ok(json!(summary)))
        }
        "stop" => return (DaemonResponse::ok(json!({ "stopping": true })), true),
        other => Ok(DaemonResponse::error(format!("unknown command '{other}'"))),
    };
    (
        response.unwrap_or_else(|err| DaemonResponse::error(err.to_string())),
        false,
    )
}

async fn queue_and_wait(
    state: &DaemonState,
    target: SyncTarget,
) -> Result<SyncSummary, DaemonError> {
    let done = state.enqueue(target, "socket").await?;
    match done.await {
        Ok(outcome) => outcome.map_err(DaemonError::Protocol),
        Err(_) => Err(DaemonError::ChannelClosed("sync response")),
    }
}

async fn build_status_payload(state: &DaemonState) -> Result<Value, DaemonError> {
    let queued: Vec<String> = {
        let queued = state.queued.lock().await;
        let mut labels: Vec<String> = queued.iter().map(SyncTarget::label).collect();
        labels.sort();
        labels
    };
    let last_run = state.last_run.read().await.clone();

    let home = state.home.clone();
    let profiles = tokio::task::spawn_blocking(move || profile_statuses(&home, Utc::now()))
        .await
        .map_err(|err| DaemonError::Protocol(format!("status join error: {err}")))??;

    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": state.started_at.to_rfc3339(),
        "socket": socket_path(&state.home).display().to_string(),
        "queued": queued,
        "last_run": last_run,
        "profiles": profiles,
    }))
}

/// Per-profile schedule and last recorded outcome.
fn profile_statuses(home: &Path, now: DateTime<Utc>) -> Result<Vec<Value>, DaemonError> {
    let mut statuses = Vec::new();
    for profile in config::list_profiles_at(home)? {
        let name = profile.name.0.as_str();
        let record = state::load_at(home, name).unwrap_or_else(|err| {
            tracing::warn!(profile = %name, error = %err, "unreadable sync record");
            None
        });
        let freshness = staleness::check(record.as_ref(), &profile.schedule, now);
        statuses.push(json!({
            "name": name,
            "schedule": profile.schedule.to_string(),
            "next_run": profile.schedule.next_after(now).to_rfc3339(),
            "freshness": freshness.label(),
            "last_record": record,
        }));
    }
    Ok(statuses)
}

async fn load_profiles(home: &Path) -> Vec<SyncProfile> {
    let home = home.to_path_buf();
    match tokio::task::spawn_blocking(move || config::list_profiles_at(&home)).await {
        Ok(Ok(profiles)) => profiles,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "could not load profiles");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "profile load join error");
            Vec::new()
        }
    }
}

async fn log_rotation_task(
    home: PathBuf,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
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

fn build_sync_summary(
    target: &SyncTarget,
    source: &'static str,
    reports: Vec<SyncReport>,
    duration: Duration,
) -> SyncSummary {
    let updated = reports
        .iter()
        .filter(|r| matches!(r.outcome, SyncOutcome::Updated { .. }))
        .count();
    SyncSummary {
        target: target.label(),
        source: source.to_string(),
        unchanged: reports.len() - updated,
        updated,
        reports,
        duration_ms: duration.as_millis(),
    }
}

/// Clear a leftover socket file, refusing if a daemon still answers on it.
fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "another daemon is listening on {}",
            socket.display()
        )));
    }
    match fs::remove_file(socket) {
        Ok(()) => {
            tracing::warn!(socket = %socket.display(), "removed stale control socket");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let logs = logs_dir(home);
    fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))
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
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

/// Install the global subscriber: console on stderr, plus the daemon log
/// files when `log_home` is given. Also captures `log` records from
/// mirror-sync. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(log_home: Option<&Path>) {
    use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let files = log_home.map(|home| {
        let out = stdout_log_path(home);
        let err = stderr_log_path(home);
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(move || append_writer(&out))
            .and_then(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(move || append_writer(&err))
                    .with_filter(LevelFilter::WARN),
            )
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(files)
        .try_init();
}

/// Open per event so rotation never leaves us writing to a renamed file.
fn append_writer(path: &Path) -> Box<dyn Write> {
    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Box::new(file),
        Err(_) => Box::new(std::io::sink()),
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
