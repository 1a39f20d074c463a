pub mod client;
pub mod error;
pub mod fake;

pub use client::{SecretStore, VaultSecretStore};
pub use error::{Result, SecretError};
pub use fake::FakeSecretStore;
