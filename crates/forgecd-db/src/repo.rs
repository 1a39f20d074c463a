pub mod build;
pub mod outbox;
pub mod pipeline;
pub mod project;
pub mod queue;
pub mod secret;
pub mod variable;
pub mod worker;

pub use build::{BuildRepo, PgBuildRepo};
pub use outbox::{OutboxRepo, PgOutboxRepo};
pub use pipeline::{PgPipelineRepo, PipelineRepo};
pub use project::{PgProjectRepo, ProjectRepo};
pub use queue::{PgQueueRepo, QueueRepo};
pub use secret::{PgSecretRepo, SecretRepo};
pub use variable::{PgVariableRepo, VariableRepo};
pub use worker::{PgWorkerRepo, WorkerRepo};
