pub mod build;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod queue;
pub mod secret;
pub mod worker;

pub use build::{Build, BuildLog, BuildStatus, BuildStep};
pub use error::{Error, Result};
pub use id::BuildKey;
pub use pipeline::{Pipeline, PipelineConfig, Project, Step};
pub use queue::{ContextBuildResult, QueueContext, QueueElement, ResolvedSecret, ResolvedVariable};
pub use secret::{Resolved, ScopedEntry, Secret, Variable};
pub use worker::{Worker, WorkerStatus, WorkerStrategy};
