//! Engine event loop (spec §4.7). Grounded on
//! `original_source/pkg/engine/engine.go` (channel topology, `select`
//! replaced here by `tokio::select!`).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgecd_core::{BuildKey, BuildStatus, ContextBuildResult, Error, QueueContext, QueueElement};
use forgecd_db::BuildRepo;
use tokio::sync::{mpsc, Mutex};

use crate::binder::Binder;
use crate::context::ContextBuilder;
use crate::services::CoreServices;

const CHANNEL_CAPACITY: usize = 64;
/// "The intended behavior is one retry; otherwise a permanently-missing
/// build row will pin a goroutine forever" (spec §9).
const INVALID_BUILD_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Handle to the running event loop: the five public trigger operations
/// (spec §6) plus `shutdown`, all implemented as synchronous (blocking)
/// channel sends so the loop's single-threaded pace provides natural
/// backpressure on producers (spec §4.7, §5).
pub struct Engine {
    schedule_tx: mpsc::Sender<String>,
    finished_tx: mpsc::Sender<String>,
    enqueue_tx: mpsc::Sender<(BuildKey, QueueContext)>,
    workers_changed_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    done_rx: Mutex<mpsc::Receiver<()>>,
}

impl Engine {
    /// Spawns the event loop task and returns a handle to its channels.
    /// `finished_tx`/`finished_rx` are created by the caller (not here)
    /// because the Binder also needs a clone of `finished_tx` to notify
    /// completion from spawned executor tasks (spec §4.4 step 6, §4.6
    /// step 5).
    pub fn start(
        services: Arc<CoreServices>,
        context_builder: Arc<ContextBuilder>,
        binder: Arc<dyn Binder>,
        finished_tx: mpsc::Sender<String>,
        finished_rx: mpsc::Receiver<String>,
    ) -> Self {
        let (schedule_tx, schedule_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (enqueue_tx, enqueue_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (workers_changed_tx, workers_changed_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);

        tokio::spawn(run_loop(
            services,
            context_builder,
            binder,
            schedule_rx,
            finished_rx,
            enqueue_tx.clone(),
            enqueue_rx,
            workers_changed_tx.clone(),
            workers_changed_rx,
            shutdown_rx,
            done_tx,
        ));

        Self {
            schedule_tx,
            finished_tx,
            enqueue_tx,
            workers_changed_tx,
            shutdown_tx,
            done_rx: Mutex::new(done_rx),
        }
    }

    pub async fn schedule(&self, build_id: impl Into<String>) {
        let _ = self.schedule_tx.send(build_id.into()).await;
    }

    pub async fn finished(&self, build_id: impl Into<String>) {
        let _ = self.finished_tx.send(build_id.into()).await;
    }

    pub async fn add_to_queue(&self, key: BuildKey, context: QueueContext) {
        let _ = self.enqueue_tx.send((key, context)).await;
    }

    pub async fn change_in_workers(&self) {
        let _ = self.workers_changed_tx.send(()).await;
    }

    /// Exits the loop and waits for its `done` acknowledgment. In-flight
    /// executors continue; new work is not bound (spec §4.7).
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        let mut done_rx = self.done_rx.lock().await;
        let _ = done_rx.recv().await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    services: Arc<CoreServices>,
    context_builder: Arc<ContextBuilder>,
    binder: Arc<dyn Binder>,
    mut schedule_rx: mpsc::Receiver<String>,
    mut finished_rx: mpsc::Receiver<String>,
    enqueue_tx: mpsc::Sender<(BuildKey, QueueContext)>,
    mut enqueue_rx: mpsc::Receiver<(BuildKey, QueueContext)>,
    workers_changed_tx: mpsc::Sender<()>,
    mut workers_changed_rx: mpsc::Receiver<()>,
    mut shutdown_rx: mpsc::Receiver<()>,
    done_tx: mpsc::Sender<()>,
) {
    // Recovery: drain any queue persisted from a previous run (spec §4.7).
    if let Err(e) = binder.bind().await {
        tracing::error!(event = "engine.recovery_bind_failed", error = %e);
    }

    loop {
        tokio::select! {
            Some(build_id) = schedule_rx.recv() => {
                handle_schedule(build_id, &services, &context_builder, &enqueue_tx).await;
            }
            Some(build_id) = finished_rx.recv() => {
                handle_finished(build_id, &services, &binder, &workers_changed_tx).await;
            }
            Some((key, context)) = enqueue_rx.recv() => {
                handle_enqueue(key, context, &services, &binder).await;
            }
            Some(()) = workers_changed_rx.recv() => {
                if let Err(e) = binder.bind().await {
                    tracing::error!(event = "engine.bind_failed", error = %e);
                }
            }
            Some(()) = shutdown_rx.recv() => {
                break;
            }
            else => break,
        }
    }

    let _ = done_tx.send(()).await;
}

async fn handle_schedule(
    build_id: String,
    services: &Arc<CoreServices>,
    context_builder: &Arc<ContextBuilder>,
    enqueue_tx: &mpsc::Sender<(BuildKey, QueueContext)>,
) {
    match context_builder.build(&build_id, Utc::now()).await {
        Ok(result) => {
            persist_seed_step(&services.build_repo, &result).await;
            let key = result.queue_context.build_key.clone();
            let _ = enqueue_tx.send((key, result.queue_context)).await;
        }
        // "Build-ID rescheduling after ErrInvalidBuild ... the intended
        // behavior is one retry" (spec §9) — the row may still be in
        // flight from the outbox-triggering insert.
        Err(Error::InvalidBuild(id)) => {
            let services = services.clone();
            let context_builder = context_builder.clone();
            let enqueue_tx = enqueue_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(INVALID_BUILD_RETRY_DELAY).await;
                match context_builder.build(&id, Utc::now()).await {
                    Ok(result) => {
                        persist_seed_step(&services.build_repo, &result).await;
                        let key = result.queue_context.build_key.clone();
                        let _ = enqueue_tx.send((key, result.queue_context)).await;
                    }
                    Err(e) => {
                        tracing::error!(event = "engine.schedule_retry_failed", build_id = %id, error = %e);
                        fail_build(&services.build_repo, &id).await;
                    }
                }
            });
        }
        Err(e) => {
            tracing::error!(event = "engine.schedule_failed", build_id = %build_id, error = %e);
            fail_build(&services.build_repo, &build_id).await;
        }
    }
}

async fn fail_build(build_repo: &Arc<dyn BuildRepo>, build_id: &str) {
    if let Ok(key) = BuildKey::from_str(build_id) {
        let _ = build_repo.set_status(&key, BuildStatus::Failed).await;
    }
}

async fn persist_seed_step(build_repo: &Arc<dyn BuildRepo>, result: &ContextBuildResult) {
    let step_id = match build_repo
        .open_step(
            &result.queue_context.build_key,
            &result.seed_step.name,
            result.seed_step.started_at,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(event = "engine.seed_step_open_failed", error = %e);
            return;
        }
    };
    for log in &result.seed_step.logs {
        let _ = build_repo.append_log(step_id, log.clone()).await;
    }
    let _ = build_repo.close_step(step_id, Utc::now()).await;
}

async fn handle_enqueue(
    key: BuildKey,
    mut context: QueueContext,
    services: &Arc<CoreServices>,
    binder: &Arc<dyn Binder>,
) {
    let now = Utc::now();
    let step_id = match services.build_repo.open_step(&key, "Worker binding", now).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(event = "engine.enqueue_open_step_failed", build_id = %key, error = %e);
            return;
        }
    };
    context.pending_step_id = Some(step_id);

    let element = QueueElement::new(context, now);
    if let Err(e) = services.queue_repo.insert(&element).await {
        tracing::error!(event = "engine.enqueue_insert_failed", build_id = %key, error = %e);
        return;
    }

    if let Err(e) = binder.bind().await {
        tracing::error!(event = "engine.bind_failed", error = %e);
    }
}

async fn handle_finished(
    build_id: String,
    services: &Arc<CoreServices>,
    binder: &Arc<dyn Binder>,
    workers_changed_tx: &mpsc::Sender<()>,
) {
    let key = match BuildKey::from_str(&build_id) {
        Ok(k) => k,
        Err(_) => {
            tracing::error!(event = "engine.finished_bad_build_id", build_id = %build_id);
            return;
        }
    };
    let build = match services.build_repo.get(&key).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(event = "engine.finished_lookup_failed", build_id = %build_id, error = %e);
            return;
        }
    };
    let Some(worker_name) = build.worker_name else {
        tracing::info!(event = "engine.finished_unbound", build_id = %build_id);
        return;
    };
    if let Err(e) = binder.unbind(&worker_name).await {
        tracing::error!(event = "engine.unbind_failed", worker = %worker_name, error = %e);
    }

    let workers_changed_tx = workers_changed_tx.clone();
    tokio::spawn(async move {
        let _ = workers_changed_tx.send(()).await;
    });
}
