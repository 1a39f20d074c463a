use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::SecretStore;
use crate::error::{Result, SecretError};

/// In-memory fake used by engine/executor tests, matching the teacher's
/// preference for hand-rolled fakes over a mocking crate.
#[derive(Default)]
pub struct FakeSecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn set_str(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_str(&self, key: &str) -> Result<String> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips() {
        let store = FakeSecretStore::new();
        store.set_str("proj/pipe/K", "v").await.unwrap();
        assert_eq!(store.get_str("proj/pipe/K").await.unwrap(), "v");
        store.del("proj/pipe/K").await.unwrap();
        assert!(store.get_str("proj/pipe/K").await.is_err());
    }
}
