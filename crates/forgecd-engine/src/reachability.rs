//! Worker reachability prober (SPEC_FULL.md §C.1). Not named as a discrete
//! component in spec.md, but spec §3 names the `unreachable` status and its
//! override semantics without saying what produces the transition. Grounded
//! on `original_source/pkg/model/worker.go`'s hook-driven `CheckConnection`
//! probing, re-architected as an explicit poller per spec §9's
//! outbox/poller guidance rather than a persistence-hook side effect.

use std::sync::Arc;
use std::time::Duration;

use forgecd_db::WorkerRepo;
use forgecd_runner::SshTransport;
use forgecd_secrets::SecretStore;

const PROBE_INTERVAL: Duration = Duration::from_secs(30);

pub struct ReachabilityProber {
    worker_repo: Arc<dyn WorkerRepo>,
    secret_store: Arc<dyn SecretStore>,
}

impl ReachabilityProber {
    pub fn new(worker_repo: Arc<dyn WorkerRepo>, secret_store: Arc<dyn SecretStore>) -> Self {
        Self {
            worker_repo,
            secret_store,
        }
    }

    /// Runs forever, probing every static worker once per `PROBE_INTERVAL`.
    /// Meant to be spawned as its own task by `forgecd-cli::main`.
    pub async fn run(&self) {
        loop {
            tokio::time::sleep(PROBE_INTERVAL).await;
            if let Err(e) = self.probe_once().await {
                tracing::warn!(event = "reachability.probe_round_failed", error = %e);
            }
        }
    }

    async fn probe_once(&self) -> forgecd_core::Result<()> {
        let workers = self.worker_repo.list_static().await.map_err(Into::into)?;
        for worker in workers {
            let reachable = self.probe(&worker.name, &worker.address, &worker.username).await;
            if let Err(e) = self.worker_repo.set_reachability(&worker.name, reachable).await {
                tracing::warn!(event = "reachability.update_failed", worker = %worker.name, error = %e);
            }
        }
        Ok(())
    }

    /// Connects and immediately shuts down; success means the worker is
    /// reachable. Reuses the SSH backend's connect step without requesting a
    /// shell-bound build session.
    async fn probe(&self, name: &str, address: &str, username: &str) -> bool {
        let key_pem = match self.secret_store.get_str(name).await {
            Ok(k) => k,
            Err(_) => return false,
        };
        match SshTransport::connect(address, username, &key_pem).await {
            Ok(mut transport) => {
                let _ = forgecd_runner::RunnerTransport::shutdown(&mut transport).await;
                true
            }
            Err(_) => false,
        }
    }
}
