//! Kubernetes backend (spec §4.2). The teacher's own Kubernetes executor
//! (`buildit-executor/src/kubernetes.rs`) is almost entirely `todo!()`
//! stubs, so this is grounded directly on
//! `original_source/pkg/kubernetes/runner.go`: pod creation (single
//! container, `stdin=true, tty=true`), a poll-until-ready loop (1s interval,
//! 5 minute timeout), an exec subresource stream, and pod deletion on
//! shutdown — translated to the `kube`/`k8s-openapi` crates' idioms.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::api::{AttachParams, AttachedProcess, DeleteParams, PostParams};
use kube::{Api, Client};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::time::sleep;

use crate::error::{Result, RunnerError};
use crate::RunnerTransport;

const POD_READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const POD_READY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const CONTAINER_NAME: &str = "worker";

pub struct KubernetesTransport {
    pods: Api<Pod>,
    pod_name: String,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    attached: AttachedProcess,
}

impl KubernetesTransport {
    /// Creates a pod in `namespace` running `image` with a single container
    /// named `worker`, waits for `Phase == Running` (5 minute timeout at
    /// 1-second intervals), then opens an exec subresource
    /// (`stdin=true, stdout=true, stderr=false, tty=false`) running `shell`
    /// and wires the stream to a Runner (spec §4.2).
    pub async fn create(client: Client, namespace: &str, image: &str, shell: &str) -> Result<Self> {
        let pods: Api<Pod> = Api::namespaced(client, namespace);
        let pod_name = format!("forgecd-{}", uuid::Uuid::now_v7());

        let pod = Pod {
            metadata: kube::api::ObjectMeta {
                name: Some(pod_name.clone()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(image.to_string()),
                    stdin: Some(true),
                    tty: Some(true),
                    ..Default::default()
                }],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        pods.create(&PostParams::default(), &pod)
            .await
            .map_err(|e| RunnerError::Construction(format!("pod create failed: {e}")))?;

        wait_until_running(&pods, &pod_name).await?;

        let mut attached = pods
            .exec(
                &pod_name,
                vec![shell],
                &AttachParams::default()
                    .container(CONTAINER_NAME)
                    .stdin(true)
                    .stdout(true)
                    .stderr(false)
                    .tty(false),
            )
            .await
            .map_err(|e| RunnerError::Construction(format!("pod exec failed: {e}")))?;

        let stdin = attached
            .stdin()
            .ok_or_else(|| RunnerError::Construction("exec stream has no stdin".to_string()))?;
        let stdout = attached
            .stdout()
            .ok_or_else(|| RunnerError::Construction("exec stream has no stdout".to_string()))?;

        Ok(Self {
            pods,
            pod_name,
            writer: Box::new(stdin),
            reader: Box::new(tokio::io::BufReader::new(stdout)),
            attached,
        })
    }
}

async fn wait_until_running(pods: &Api<Pod>, pod_name: &str) -> Result<()> {
    let deadline = tokio::time::Instant::now() + POD_READY_TIMEOUT;
    loop {
        let pod = pods
            .get(pod_name)
            .await
            .map_err(|e| RunnerError::Construction(format!("pod get failed: {e}")))?;
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("");
        if phase == "Running" {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(RunnerError::Construction(format!(
                "pod {pod_name} did not reach Running within {POD_READY_TIMEOUT:?}"
            )));
        }
        sleep(POD_READY_POLL_INTERVAL).await;
    }
}

#[async_trait]
impl RunnerTransport for KubernetesTransport {
    fn writer(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        &mut self.writer
    }

    fn reader(&mut self) -> &mut (dyn AsyncBufRead + Send + Unpin) {
        &mut self.reader
    }

    /// Deletes the pod (spec §4.2). `Unbind` for the Kubernetes Binder is a
    /// separate no-op (spec §9) — pod lifecycle is entirely tied to this
    /// shutdown, not to capacity accounting.
    async fn shutdown(&mut self) -> Result<()> {
        let _ = self.attached.join().await;
        self.pods
            .delete(&self.pod_name, &DeleteParams::default())
            .await
            .map_err(|e| RunnerError::Transport(format!("pod delete failed: {e}")))?;
        Ok(())
    }
}
