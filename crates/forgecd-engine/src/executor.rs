//! Executor (spec §4.6). Grounded on `original_source/pkg/engine/
//! {execute,run}.go`: step loop, unconditional cleanup, unconditional
//! shutdown, asynchronous `Finished` notification.

use std::sync::Arc;

use chrono::Utc;
use forgecd_core::{BuildKey, BuildLog, BuildStatus, QueueContext};
use forgecd_db::BuildRepo;
use forgecd_runner::{AnyRunner, RunnerError, RunnerEvent};
use tokio::sync::mpsc;

pub struct Executor {
    build_repo: Arc<dyn BuildRepo>,
}

impl Executor {
    pub fn new(build_repo: Arc<dyn BuildRepo>) -> Self {
        Self { build_repo }
    }

    /// Drives `runner` through `context`'s steps (spec §4.6 steps 1-4, 6).
    /// Step 5 (notifying the engine) is the caller's responsibility —
    /// `spawn` below sends on `finished_tx` once this returns, so the
    /// notification is never blocked on by the engine's event loop.
    pub async fn execute(&self, build_key: &BuildKey, context: &QueueContext, mut runner: AnyRunner) {
        let mut final_status = BuildStatus::Successful;
        let mut cancelled = matches!(
            self.build_repo.status(build_key).await,
            Ok(BuildStatus::Canceled)
        );
        if cancelled {
            final_status = BuildStatus::Canceled;
        }

        if !cancelled {
            for step in &context.config.steps {
                if matches!(
                    self.build_repo.status(build_key).await,
                    Ok(BuildStatus::Canceled)
                ) {
                    cancelled = true;
                    final_status = BuildStatus::Canceled;
                    break;
                }

                let started_at = Utc::now();
                let step_id = match self.build_repo.open_step(build_key, &step.name, started_at).await {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!(event = "executor.open_step_failed", build_id = %build_key, error = %e);
                        final_status = BuildStatus::Failed;
                        break;
                    }
                };

                let result = self.run_commands(step_id, &step.commands, &mut runner).await;
                let _ = self.build_repo.close_step(step_id, Utc::now()).await;

                if let Err(e) = result {
                    final_status = BuildStatus::Failed;
                    tracing::warn!(event = "executor.step_failed", build_id = %build_key, step = %step.name, error = %e);
                    break;
                }
            }
        }

        // Step 3: cleanup runs regardless of the outcome above.
        let cleanup_started = Utc::now();
        match self
            .build_repo
            .open_step(build_key, "cleanup", cleanup_started)
            .await
        {
            Ok(step_id) => {
                if let Err(e) = self.run_commands(step_id, &context.config.cleanup, &mut runner).await {
                    tracing::warn!(event = "executor.cleanup_failed", build_id = %build_key, error = %e);
                }
                let _ = self.build_repo.close_step(step_id, Utc::now()).await;
            }
            Err(e) => {
                tracing::error!(event = "executor.open_cleanup_step_failed", build_id = %build_key, error = %e);
            }
        }

        // Step 4: always release transport resources.
        if let Err(e) = runner.shutdown().await {
            tracing::warn!(event = "executor.shutdown_failed", build_id = %build_key, error = %e);
        }

        // Step 6: final status, unless already failed/canceled above.
        if !matches!(final_status, BuildStatus::Failed | BuildStatus::Canceled) {
            final_status = BuildStatus::Successful;
        }
        if let Err(e) = self.build_repo.set_status(build_key, final_status).await {
            tracing::error!(event = "executor.set_final_status_failed", build_id = %build_key, error = %e);
        }
    }

    async fn run_commands(
        &self,
        step_id: uuid::Uuid,
        commands: &[String],
        runner: &mut AnyRunner,
    ) -> Result<(), RunnerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = runner.run(commands, &tx).await;
        drop(tx);

        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Cmd { cmd, idx, total } => {
                    let _ = self
                        .build_repo
                        .append_log(step_id, BuildLog::command(cmd, idx as i32, total as i32))
                        .await;
                }
                RunnerEvent::Out(line) => {
                    let _ = self.build_repo.append_output(step_id, &line).await;
                }
            }
        }

        result
    }
}

/// Spawns the execution as an independent task (spec §5: "Work that must not
/// block the loop — executing a build — is dispatched to independent
/// concurrent tasks"), sending `build_key` on `finished_tx` once done.
pub fn spawn(
    build_repo: Arc<dyn BuildRepo>,
    context: QueueContext,
    runner: AnyRunner,
    finished_tx: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        let build_key = context.build_key.clone();
        let executor = Executor::new(build_repo);
        executor.execute(&build_key, &context, runner).await;
        let _ = finished_tx.send(build_key.to_string()).await;
    });
}
