//! Scheduling core: worker selection, context building, binding, and
//! execution (spec §4), wired together by the `Engine` event loop (spec
//! §4.7).

pub mod binder;
pub mod context;
pub mod engine;
pub mod executor;
pub mod reachability;
pub mod select;
pub mod services;

pub use binder::{Binder, KubernetesBinder, StandaloneBinder};
pub use context::ContextBuilder;
pub use engine::Engine;
pub use executor::{spawn as spawn_executor, Executor};
pub use reachability::ReachabilityProber;
pub use select::{select_worker, select_worker_for_pipeline, SelectError};
pub use services::CoreServices;
