//! Process entrypoint: CLI parsing, logging setup, `CoreServices`
//! construction, engine startup, outbox poller, reachability prober,
//! signal-driven shutdown (spec §6). Grounded on `buildit-api/src/main.rs`'s
//! tracing-init-then-serve shape, combined with `buildit-cli/src/main.rs`'s
//! clap derive usage — this binary is a long-running service, not a CLI
//! client, so it reads closer to `buildit-api`'s main than `buildit-cli`'s.

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::{Config, K8sMode, Scheduler};
use forgecd_db::{
    PgBuildRepo, PgOutboxRepo, PgPipelineRepo, PgProjectRepo, PgQueueRepo, PgSecretRepo,
    PgVariableRepo, PgWorkerRepo,
};
use forgecd_engine::{Binder, ContextBuilder, CoreServices, Engine, KubernetesBinder, ReachabilityProber, StandaloneBinder};
use forgecd_runner::DockerClientManager;
use forgecd_secrets::{SecretStore, VaultSecretStore};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const FINISHED_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(event = "forgecd.startup_failed", error = %e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    info!(event = "forgecd.connecting_database");
    let pool = forgecd_db::create_pool(&config.database_url).await?;
    forgecd_db::run_migrations(&pool).await?;
    info!(event = "forgecd.database_ready");

    let secret_store: Arc<dyn SecretStore> = Arc::new(VaultSecretStore::new(
        config.secret_store_url.clone(),
        config.secret_store_token.clone(),
    ));
    let docker_manager = Arc::new(DockerClientManager::new());

    let build_repo = Arc::new(PgBuildRepo::new(pool.clone()));
    let pipeline_repo = Arc::new(PgPipelineRepo::new(pool.clone()));
    let project_repo = Arc::new(PgProjectRepo::new(pool.clone()));
    let worker_repo = Arc::new(PgWorkerRepo::new(pool.clone()));
    let secret_repo = Arc::new(PgSecretRepo::new(pool.clone()));
    let variable_repo = Arc::new(PgVariableRepo::new(pool.clone()));
    let queue_repo = Arc::new(PgQueueRepo::new(pool.clone()));
    let outbox_repo = Arc::new(PgOutboxRepo::new(pool.clone()));

    let kube_client = match config.scheduler {
        Scheduler::K8s => Some(build_kube_client(&config).await?),
        Scheduler::Standalone => None,
    };

    let services = Arc::new(CoreServices::new(
        pool.clone(),
        build_repo.clone(),
        pipeline_repo.clone(),
        project_repo.clone(),
        worker_repo.clone(),
        secret_repo.clone(),
        variable_repo.clone(),
        queue_repo.clone(),
        outbox_repo.clone(),
        secret_store.clone(),
        docker_manager.clone(),
        kube_client.clone(),
    ));

    let context_builder = Arc::new(ContextBuilder::new(
        build_repo.clone(),
        pipeline_repo,
        project_repo,
        secret_repo,
        variable_repo,
        secret_store.clone(),
    ));

    let (finished_tx, finished_rx) = mpsc::channel(FINISHED_CHANNEL_CAPACITY);

    let binder: Arc<dyn Binder> = match config.scheduler {
        Scheduler::Standalone => Arc::new(StandaloneBinder::new(
            pool.clone(),
            build_repo.clone(),
            worker_repo.clone(),
            queue_repo.clone(),
            secret_store.clone(),
            docker_manager.clone(),
            finished_tx.clone(),
        )),
        Scheduler::K8s => {
            let namespace = config
                .k8s_namespace
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--k8s-namespace is required when scheduler = k8s"))?;
            Arc::new(KubernetesBinder::new(
                pool.clone(),
                build_repo.clone(),
                queue_repo.clone(),
                kube_client.clone().expect("kube client built above for k8s scheduler"),
                namespace,
                finished_tx.clone(),
            ))
        }
    };

    let engine = Arc::new(Engine::start(
        services.clone(),
        context_builder,
        binder,
        finished_tx,
        finished_rx,
    ));

    let prober = ReachabilityProber::new(worker_repo, secret_store);
    tokio::spawn(async move { prober.run().await });

    let outbox_engine = engine.clone();
    let outbox_repo_poll = outbox_repo;
    let batch_size = config.outbox_batch_size;
    let poll_interval = Duration::from_millis(config.outbox_poll_interval_ms);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(poll_interval).await;
            match outbox_repo_poll.claim_batch(batch_size).await {
                Ok(build_keys) => {
                    for build_key in build_keys {
                        outbox_engine.schedule(build_key).await;
                    }
                }
                Err(e) => {
                    error!(event = "forgecd.outbox_poll_failed", error = %e);
                }
            }
        }
    });

    info!(event = "forgecd.ready", scheduler = ?config.scheduler);
    wait_for_shutdown_signal().await;
    info!(event = "forgecd.shutting_down");
    engine.shutdown().await;
    docker_manager.shutdown_all().await;
    info!(event = "forgecd.shutdown_complete");

    Ok(())
}

async fn build_kube_client(config: &Config) -> anyhow::Result<kube::Client> {
    match config.k8s_mode {
        K8sMode::Inner => Ok(kube::Client::try_default().await?),
        K8sMode::Outer => {
            let kubeconfig = match &config.kubeconfig {
                Some(path) => kube::config::Kubeconfig::read_from(path)?,
                None => kube::config::Kubeconfig::read()?,
            };
            let kube_config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &Default::default()).await?;
            Ok(kube::Client::try_from(kube_config)?)
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
