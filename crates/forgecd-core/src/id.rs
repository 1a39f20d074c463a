use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A build's natural key: `(project_name, pipeline_name, number)`.
///
/// Formats and parses as `"<project>/<pipeline>/<number>"`, which also
/// serves as the queue element ID and the log correlation key (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildKey {
    pub project: String,
    pub pipeline: String,
    pub number: i64,
}

impl BuildKey {
    pub fn new(project: impl Into<String>, pipeline: impl Into<String>, number: i64) -> Self {
        Self {
            project: project.into(),
            pipeline: pipeline.into(),
            number,
        }
    }

    /// Replaces `/` with `_`, matching the workdir derivation in spec §4.5.
    pub fn as_workdir(&self) -> String {
        self.to_string().replace('/', "_")
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.pipeline, self.number)
    }
}

impl FromStr for BuildKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        let (Some(project), Some(pipeline), Some(number)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidBuild(s.to_string()));
        };
        let number: i64 = number
            .parse()
            .map_err(|_| Error::InvalidBuild(s.to_string()))?;
        Ok(Self::new(project, pipeline, number))
    }
}
