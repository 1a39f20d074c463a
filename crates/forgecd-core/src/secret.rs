use serde::{Deserialize, Serialize};

/// `(key, project_name?, pipeline_name?)` (spec §3). Shared shape for both
/// secrets and variables; the only difference between the two kinds is
/// where the value lives (secret store vs. inline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedEntry {
    pub key: String,
    pub project_name: Option<String>,
    pub pipeline_name: Option<String>,
    /// Optional file path the resolved value is written to instead of being
    /// exported inline (spec §4.5 secrets/variables steps).
    pub path: Option<String>,
}

impl ScopedEntry {
    /// Keys beginning with `_` are reserved for system-injected variables
    /// and must be rejected at creation/update (spec §3).
    pub fn validate_key(key: &str) -> Result<(), String> {
        if key.starts_with('_') {
            return Err(format!(
                "key {key:?} is reserved (keys beginning with '_' are system-injected)"
            ));
        }
        Ok(())
    }

    /// `"[project/][pipeline/]key"`, the secret store's key path (spec §3).
    pub fn secret_store_key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(p) = &self.project_name {
            parts.push(p.as_str());
        }
        if let Some(p) = &self.pipeline_name {
            parts.push(p.as_str());
        }
        parts.push(self.key.as_str());
        parts.join("/")
    }
}

/// A secret's value lives in the external secret store, keyed by
/// `secret_store_key()`; this struct only carries the scoping metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub entry: ScopedEntry,
}

/// A variable's value is stored inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub entry: ScopedEntry,
    pub value: String,
}

/// A resolved entry after shadowing (spec §4.5 steps 4-5): the most specific
/// scope wins (pipeline > project > global).
#[derive(Debug, Clone)]
pub struct Resolved<V> {
    pub key: String,
    pub path: Option<String>,
    pub value: V,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_underscore_prefixed_keys() {
        assert!(ScopedEntry::validate_key("_SYSTEM").is_err());
        assert!(ScopedEntry::validate_key("NORMAL").is_ok());
    }

    #[test]
    fn secret_store_key_scopes() {
        let global = ScopedEntry {
            key: "K".into(),
            project_name: None,
            pipeline_name: None,
            path: None,
        };
        assert_eq!(global.secret_store_key(), "K");

        let scoped = ScopedEntry {
            key: "K".into(),
            project_name: Some("proj".into()),
            pipeline_name: Some("pipe".into()),
            path: None,
        };
        assert_eq!(scoped.secret_store_key(), "proj/pipe/K");
    }
}
