//! CLI/env surface (spec §6). Grounded on `buildit-cli/src/main.rs`'s
//! `#[arg(long, env = "...")]` usage, adapted for a long-running service
//! rather than a one-shot HTTP client.

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "forgecd", about = "CI/CD build-orchestration core", long_about = None)]
pub struct Config {
    /// Which Binder to run: SSH/Docker worker matchmaking, or one pod per
    /// queue element in a Kubernetes namespace (spec §6).
    #[arg(long, env = "FORGECD_SCHEDULER", value_enum, default_value = "standalone")]
    pub scheduler: Scheduler,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Used both for standalone SSH worker key fetching and, regardless of
    /// scheduler mode, by the context builder to resolve build secrets.
    #[arg(long, env = "FORGECD_SECRET_STORE_URL")]
    pub secret_store_url: String,

    #[arg(long, env = "FORGECD_SECRET_STORE_TOKEN")]
    pub secret_store_token: String,

    /// Required when `scheduler = k8s`.
    #[arg(long, env = "FORGECD_K8S_NAMESPACE")]
    pub k8s_namespace: Option<String>,

    /// Path to a kubeconfig file. Unset means in-cluster service-account
    /// auth when `k8s_mode = inner`.
    #[arg(long, env = "FORGECD_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// `inner`: in-cluster service-account auth. `outer`: kubeconfig-derived
    /// client, for running the scheduler outside the cluster it dispatches
    /// pods into.
    #[arg(long, env = "FORGECD_K8S_MODE", value_enum, default_value = "inner")]
    pub k8s_mode: K8sMode,

    /// How many outbox rows the poller claims per tick.
    #[arg(long, env = "FORGECD_OUTBOX_BATCH_SIZE", default_value = "50")]
    pub outbox_batch_size: i64,

    /// Outbox poll interval, in milliseconds.
    #[arg(long, env = "FORGECD_OUTBOX_POLL_INTERVAL_MS", default_value = "500")]
    pub outbox_poll_interval_ms: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheduler {
    Standalone,
    K8s,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum K8sMode {
    Inner,
    Outer,
}
