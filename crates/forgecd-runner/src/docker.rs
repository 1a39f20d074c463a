//! Docker host backend + process-wide client manager (spec §4.2, §5).
//! Grounded on `buildit-executor/src/docker.rs` (bollard usage: image pull
//! drain, container create/attach/start, `AutoRemove`, force-remove
//! teardown) and `original_source/pkg/docker/manager.go` (per-host client
//! cache, fan-out shutdown).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    RemoveContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;

use crate::error::{Result, RunnerError};
use crate::RunnerTransport;

pub struct DockerTransport {
    docker: Docker,
    container_id: String,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl DockerTransport {
    /// Pulls `image` (draining the pull progress stream), creates a
    /// container with interactive stdin/stdout/stderr attached,
    /// `AutoRemove=true`, optionally privileged, attaches to its streams,
    /// and starts it (spec §4.2).
    pub async fn create(docker: Docker, image: &str, privileged: bool) -> Result<Self> {
        let mut pull_stream = docker.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull_stream.next().await {
            progress.map_err(|e| RunnerError::Construction(format!("image pull failed: {e}")))?;
        }

        let container_name = format!("forgecd-{}", uuid_v7());
        let config = Config {
            image: Some(image.to_string()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            tty: Some(false),
            host_config: Some(bollard::models::HostConfig {
                auto_remove: Some(true),
                privileged: Some(privileged),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| RunnerError::Construction(format!("container create failed: {e}")))?;

        let AttachContainerResults { output, input } = docker
            .attach_container(
                &created.id,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RunnerError::Construction(format!("container attach failed: {e}")))?;

        docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(|e| RunnerError::Construction(format!("container start failed: {e}")))?;

        let byte_stream = output.map(|chunk| {
            chunk
                .map(|log| log.into_bytes())
                .map_err(std::io::Error::other)
        });
        let reader = tokio::io::BufReader::new(StreamReader::new(byte_stream));

        Ok(Self {
            docker,
            container_id: created.id,
            writer: Box::new(input),
            reader: Box::new(reader),
        })
    }
}

#[async_trait]
impl RunnerTransport for DockerTransport {
    fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        &mut self.writer
    }

    fn reader(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin) {
        &mut self.reader
    }

    /// Detaches and removes the container with `Force=true` (spec §4.2).
    async fn shutdown(&mut self) -> Result<()> {
        self.docker
            .remove_container(
                &self.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RunnerError::Transport(format!("container remove failed: {e}")))?;
        Ok(())
    }
}

fn uuid_v7() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Process-wide mapping from host address to Docker client, shared across
/// concurrent builds (spec §4.2, §5). Creation is lazy; deletion is explicit
/// on worker removal; lookups during construction race with updates, so
/// construction rechecks-or-creates rather than assuming presence.
#[derive(Default)]
pub struct DockerClientManager {
    clients: Mutex<HashMap<String, Arc<Docker>>>,
}

impl DockerClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for `host`, creating one with version
    /// negotiation if absent.
    pub async fn get_or_create(&self, host: &str) -> Result<Arc<Docker>> {
        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(host) {
            return Ok(existing.clone());
        }
        let docker = Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| RunnerError::Construction(format!("docker connect to {host}: {e}")))?;
        let docker = Arc::new(docker);
        clients.insert(host.to_string(), docker.clone());
        Ok(docker)
    }

    pub async fn remove(&self, host: &str) {
        self.clients.lock().await.remove(host);
    }

    /// Releases every cached client handle (spec §4.2). `Docker` has no
    /// explicit close call of its own; its underlying hyper transport is
    /// torn down on drop, so shutdown here means dropping our `Arc`s —
    /// builds still holding a clone keep their connection alive until they
    /// finish.
    pub async fn shutdown_all(&self) {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        clients.clear();
        tracing::info!(event = "docker.shutdown_all", clients = count);
    }
}
