//! Transactional Binder (spec §4.4), both the standalone variant and the
//! Kubernetes no-op-`Unbind` variant (spec §9). Grounded on
//! `original_source/pkg/engine/standalone/{bind,binder}.go` and
//! `original_source/pkg/engine/k8s/binder.go`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use forgecd_core::{BuildLog, BuildStatus, Error, Result};
use forgecd_db::{BuildRepo, QueueRepo, WorkerRepo};
use forgecd_runner::{AnyRunner, DockerClientManager, DockerTransport, SshTransport};
use forgecd_secrets::SecretStore;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::executor;
use crate::select::{select_worker, SelectError};

#[async_trait]
pub trait Binder: Send + Sync {
    async fn bind(&self) -> Result<()>;
    async fn unbind(&self, worker_name: &str) -> Result<()>;
}

/// SSH/Docker worker matchmaking (spec §4.4) — the default mode.
pub struct StandaloneBinder {
    pool: PgPool,
    build_repo: Arc<dyn BuildRepo>,
    worker_repo: Arc<dyn WorkerRepo>,
    queue_repo: Arc<dyn QueueRepo>,
    secret_store: Arc<dyn SecretStore>,
    docker_manager: Arc<DockerClientManager>,
    finished_tx: mpsc::Sender<String>,
}

impl StandaloneBinder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        build_repo: Arc<dyn BuildRepo>,
        worker_repo: Arc<dyn WorkerRepo>,
        queue_repo: Arc<dyn QueueRepo>,
        secret_store: Arc<dyn SecretStore>,
        docker_manager: Arc<DockerClientManager>,
        finished_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            pool,
            build_repo,
            worker_repo,
            queue_repo,
            secret_store,
            docker_manager,
            finished_tx,
        }
    }

    async fn construct_runner(
        &self,
        worker: &forgecd_core::Worker,
        config: &forgecd_core::PipelineConfig,
    ) -> std::result::Result<AnyRunner, String> {
        if worker.is_static {
            let key_pem = self
                .secret_store
                .get_str(&worker.name)
                .await
                .map_err(|e| format!("fetching private key for {}: {e}", worker.name))?;
            let transport = SshTransport::connect(&worker.address, &worker.username, &key_pem)
                .await
                .map_err(|e| e.to_string())?;
            Ok(AnyRunner::Ssh(forgecd_runner::Runner::new(transport)))
        } else {
            let image = config.image.clone().unwrap_or_default();
            let docker = self
                .docker_manager
                .get_or_create(&worker.address)
                .await
                .map_err(|e| e.to_string())?;
            let transport = DockerTransport::create((*docker).clone(), &image, false)
                .await
                .map_err(|e| e.to_string())?;
            Ok(AnyRunner::Docker(forgecd_runner::Runner::new(transport)))
        }
    }
}

#[async_trait]
impl Binder for StandaloneBinder {
    async fn bind(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let elements = self
            .queue_repo
            .list_fifo(&mut tx)
            .await
            .map_err(Into::<Error>::into)?;

        for element in elements {
            let workers = self
                .worker_repo
                .list_non_unreachable()
                .await
                .map_err(Into::<Error>::into)?;

            let worker = match select_worker(&element.context.config, &workers) {
                Ok(w) => w.clone(),
                Err(SelectError::NoAvailableWorker) => break,
                Err(SelectError::NoAvailableWorkerForConfiguration) => continue,
            };

            self.worker_repo
                .bind(&mut tx, &worker.name)
                .await
                .map_err(Into::<Error>::into)?;

            let now = Utc::now();
            let step_id = element
                .context
                .pending_step_id
                .ok_or_else(|| Error::Internal("queue element missing pending step".into()))?;
            self.build_repo
                .append_log_tx(
                    &mut tx,
                    step_id,
                    BuildLog::synthetic(format!("[bind] worker={}", worker.name)),
                )
                .await
                .map_err(Into::<Error>::into)?;
            self.build_repo
                .set_worker_tx(&mut tx, &element.context.build_key, &worker.name)
                .await
                .map_err(Into::<Error>::into)?;
            self.build_repo
                .set_status_tx(&mut tx, &element.context.build_key, BuildStatus::Running)
                .await
                .map_err(Into::<Error>::into)?;
            self.build_repo
                .close_step_tx(&mut tx, step_id, now)
                .await
                .map_err(Into::<Error>::into)?;

            match self.construct_runner(&worker, &element.context.config).await {
                Ok(runner) => {
                    self.queue_repo
                        .delete(&mut tx, &element.id)
                        .await
                        .map_err(Into::<Error>::into)?;
                    executor::spawn(
                        self.build_repo.clone(),
                        element.context,
                        runner,
                        self.finished_tx.clone(),
                    );
                }
                Err(msg) => {
                    tracing::error!(
                        event = "binder.runner_construction_failed",
                        worker = %worker.name,
                        error = %msg,
                    );
                    self.build_repo
                        .set_status_tx(&mut tx, &element.context.build_key, BuildStatus::Failed)
                        .await
                        .map_err(Into::<Error>::into)?;
                    // Compensate the capacity increment above (spec §8
                    // scenario 5, §9) — the queue element is left in place
                    // so operators can inspect it.
                    self.worker_repo
                        .compensate_failed_bind(&mut tx, &worker.name)
                        .await
                        .map_err(Into::<Error>::into)?;
                }
            }
        }

        tx.commit().await.map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn unbind(&self, worker_name: &str) -> Result<()> {
        self.worker_repo
            .unbind(worker_name)
            .await
            .map_err(Into::into)
    }
}

/// Kubernetes mode: worker-level selection is bypassed entirely, every
/// queue element gets its own pod (spec §3, §9). `unbind` is a literal
/// no-op — pod lifecycle is tied to executor shutdown, and there is no
/// capacity accounting to release.
pub struct KubernetesBinder {
    pool: PgPool,
    build_repo: Arc<dyn BuildRepo>,
    queue_repo: Arc<dyn QueueRepo>,
    kube_client: kube::Client,
    namespace: String,
    shell: String,
    finished_tx: mpsc::Sender<String>,
}

impl KubernetesBinder {
    pub fn new(
        pool: PgPool,
        build_repo: Arc<dyn BuildRepo>,
        queue_repo: Arc<dyn QueueRepo>,
        kube_client: kube::Client,
        namespace: String,
        finished_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            pool,
            build_repo,
            queue_repo,
            kube_client,
            namespace,
            shell: "/bin/sh".to_string(),
            finished_tx,
        }
    }
}

#[async_trait]
impl Binder for KubernetesBinder {
    async fn bind(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let elements = self
            .queue_repo
            .list_fifo(&mut tx)
            .await
            .map_err(Into::<Error>::into)?;

        for element in elements {
            let image = element.context.config.image.clone().unwrap_or_default();
            let transport = match forgecd_runner::KubernetesTransport::create(
                self.kube_client.clone(),
                &self.namespace,
                &image,
                &self.shell,
            )
            .await
            {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(event = "binder.pod_construction_failed", error = %e);
                    self.build_repo
                        .set_status_tx(&mut tx, &element.context.build_key, BuildStatus::Failed)
                        .await
                        .map_err(Into::<Error>::into)?;
                    continue;
                }
            };

            let now = Utc::now();
            if let Some(step_id) = element.context.pending_step_id {
                self.build_repo
                    .append_log_tx(
                        &mut tx,
                        step_id,
                        BuildLog::synthetic("[bind] kubernetes pod".to_string()),
                    )
                    .await
                    .map_err(Into::<Error>::into)?;
                self.build_repo
                    .close_step_tx(&mut tx, step_id, now)
                    .await
                    .map_err(Into::<Error>::into)?;
            }
            self.build_repo
                .set_status_tx(&mut tx, &element.context.build_key, BuildStatus::Running)
                .await
                .map_err(Into::<Error>::into)?;

            self.queue_repo
                .delete(&mut tx, &element.id)
                .await
                .map_err(Into::<Error>::into)?;

            executor::spawn(
                self.build_repo.clone(),
                element.context,
                AnyRunner::Kubernetes(forgecd_runner::Runner::new(transport)),
                self.finished_tx.clone(),
            );
        }

        tx.commit().await.map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn unbind(&self, _worker_name: &str) -> Result<()> {
        Ok(())
    }
}
