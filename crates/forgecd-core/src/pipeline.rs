use serde::{Deserialize, Serialize};

/// A single named step with its shell commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub commands: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }
}

/// `{system, image, steps[], cleanup[]}` (spec §3). Only `system == "linux"`
/// is supported; anything else is a user error at context-creation time
/// (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub system: String,
    pub image: Option<String>,
    pub steps: Vec<Step>,
    pub cleanup: Vec<String>,
}

impl PipelineConfig {
    pub const SUPPORTED_SYSTEM: &'static str = "linux";

    pub fn is_supported(&self) -> bool {
        self.system == Self::SUPPORTED_SYSTEM
    }
}

/// `(project_name, name)` primary key (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub project_name: String,
    pub name: String,
    pub branch: String,
    pub config: PipelineConfig,
}

/// `(name)` primary key; `repo` URL (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub repo: String,
}
