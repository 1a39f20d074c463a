//! Context builder (spec §4.5). Grounded on
//! `original_source/pkg/engine/createenvsteps.go` (exact shell templates) and
//! `original_source/pkg/engine/run.go`'s `newQueueContext` (retry-once
//! semantics for `ErrInvalidBuild`, left to the caller — see `engine.rs`).

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use forgecd_core::{
    BuildKey, BuildLog, BuildStep, ContextBuildResult, Error, PipelineConfig, QueueContext,
    Resolved, ResolvedSecret, ResolvedVariable, Result, ScopedEntry, Step,
};
use forgecd_db::{BuildRepo, DbError, PipelineRepo, ProjectRepo, SecretRepo, VariableRepo};
use forgecd_secrets::SecretStore;
use regex::Regex;

const SECRETS_INIT_STEP: &str = "Queue context creation";

pub struct ContextBuilder {
    build_repo: Arc<dyn BuildRepo>,
    pipeline_repo: Arc<dyn PipelineRepo>,
    project_repo: Arc<dyn ProjectRepo>,
    secret_repo: Arc<dyn SecretRepo>,
    variable_repo: Arc<dyn VariableRepo>,
    secret_store: Arc<dyn SecretStore>,
}

impl ContextBuilder {
    pub fn new(
        build_repo: Arc<dyn BuildRepo>,
        pipeline_repo: Arc<dyn PipelineRepo>,
        project_repo: Arc<dyn ProjectRepo>,
        secret_repo: Arc<dyn SecretRepo>,
        variable_repo: Arc<dyn VariableRepo>,
        secret_store: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            build_repo,
            pipeline_repo,
            project_repo,
            secret_repo,
            variable_repo,
            secret_store,
        }
    }

    /// Builds a `QueueContext` from persistent state (spec §4.5 steps 1-7).
    pub async fn build(&self, build_id: &str, now: DateTime<Utc>) -> Result<ContextBuildResult> {
        let key = BuildKey::from_str(build_id)?;

        let build = match self.build_repo.get(&key).await {
            Ok(b) => b,
            Err(DbError::NotFound(_)) => return Err(Error::InvalidBuild(build_id.to_string())),
            Err(e) => return Err(e.into()),
        };

        let pipeline = match self.pipeline_repo.get(&key.project, &key.pipeline).await {
            Ok(p) => p,
            Err(DbError::NotFound(_)) => {
                return Err(Error::InvalidPipeline {
                    project: key.project.clone(),
                    pipeline: key.pipeline.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let project = match self.project_repo.get(&key.project).await {
            Ok(p) => p,
            Err(DbError::NotFound(_)) => return Err(Error::InvalidProject(key.project.clone())),
            Err(e) => return Err(e.into()),
        };

        if !pipeline.config.is_supported() {
            return Err(Error::UnsupportedSystem(pipeline.config.system.clone()));
        }

        let resolved_secrets: Vec<ScopedEntry> = self
            .secret_repo
            .resolve(&key.project, &key.pipeline)
            .await
            .map_err(|e| Error::InvalidSecrets(e.to_string()))?;

        let resolved_variables: Vec<Resolved<String>> = self
            .variable_repo
            .resolve(&key.project, &key.pipeline)
            .await
            .map_err(|e| Error::InvalidVariables(e.to_string()))?;

        let mut seed_step = BuildStep::open(SECRETS_INIT_STEP, now);
        seed_step.append_log(BuildLog::synthetic(format!("[build init] {build_id}")));
        seed_step.append_log(BuildLog::synthetic(format!(
            "[pipeline init] {}/{}",
            pipeline.project_name, pipeline.name
        )));
        seed_step.append_log(BuildLog::synthetic(format!("[project init] {}", project.repo)));
        seed_step.append_log(BuildLog::synthetic(format!(
            "[secrets init] {} resolved",
            resolved_secrets.len()
        )));
        seed_step.append_log(BuildLog::synthetic(format!(
            "[variables init] {} resolved",
            resolved_variables.len()
        )));

        let mut config = pipeline.config.clone();
        let (secrets_step, secrets_cleanup) = self
            .build_secrets_step(&resolved_secrets)
            .await
            .map_err(|e| Error::InvalidSecrets(e.to_string()))?;
        let (variables_step, variables_cleanup) =
            build_variables_step(&project, &pipeline, &resolved_variables);

        let workdir = key.as_workdir();
        let workdir_step = Step::new(
            "workdir",
            vec![format!("cd ~ && mkdir -p {workdir} && cd {workdir}")],
        );
        let workdir_cleanup = format!("cd ~ && rm -rf {workdir}");

        let mut steps = vec![workdir_step, secrets_step, variables_step];
        steps.append(&mut config.steps);
        config.steps = steps;

        let mut cleanup = vec![workdir_cleanup];
        cleanup.extend(secrets_cleanup);
        cleanup.extend(variables_cleanup);
        cleanup.extend(config.cleanup.drain(..));
        config.cleanup = cleanup;

        let queue_context = QueueContext {
            build_key: key.clone(),
            repo: project.repo,
            branch: pipeline.branch,
            config,
            secrets: resolved_secrets
                .into_iter()
                .map(|s| ResolvedSecret {
                    store_key: s.secret_store_key(),
                    path: s.path,
                    key: s.key,
                })
                .collect(),
            variables: resolved_variables.into_iter().map(ResolvedVariable::from).collect(),
            worker_name: None,
            pending_step_id: None,
        };

        Ok(ContextBuildResult {
            build,
            queue_context,
            seed_step,
        })
    }

    /// Decodes each secret's base64-stored value from the secret store and
    /// emits `export _<KEY>="<value>"`, or writes it to `path` and exports
    /// the path instead (spec §4.5 step 7).
    async fn build_secrets_step(
        &self,
        entries: &[ScopedEntry],
    ) -> std::result::Result<(Step, Vec<String>), forgecd_secrets::SecretError> {
        let mut commands = Vec::new();
        let mut cleanup = Vec::new();
        for entry in entries {
            let stored = self.secret_store.get_str(&entry.secret_store_key()).await?;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(stored.as_bytes())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or(stored);

            match &entry.path {
                None => {
                    commands.push(format!("export _{}=\"{}\"", entry.key, decoded));
                }
                Some(path) => {
                    commands.push(format!("printf '%s' \"{decoded}\" > {path}"));
                    commands.push(format!("export _{}=\"{}\"", entry.key, path));
                    cleanup.push(format!("rm -f {path}"));
                }
            }
        }
        Ok((Step::new("secrets", commands), cleanup))
    }
}

/// `git@github.com:owner/name.git` (spec §4.5 step 7, SPEC_FULL §C.3).
fn github_ssh_pattern() -> Regex {
    Regex::new(r"^git@github\.com:([^/]+)/([^/.]+)(?:\.git)?$").expect("valid regex")
}

/// `https://github.com/owner/name`.
fn github_https_pattern() -> Regex {
    Regex::new(r"^https://github\.com/([^/]+)/([^/.]+)(?:\.git)?/?$").expect("valid regex")
}

fn github_owner_and_name(repo: &str) -> Option<(String, String)> {
    for pattern in [github_ssh_pattern(), github_https_pattern()] {
        if let Some(caps) = pattern.captures(repo) {
            return Some((caps[1].to_string(), caps[2].to_string()));
        }
    }
    None
}

fn build_variables_step(
    project: &forgecd_core::Project,
    pipeline: &forgecd_core::Pipeline,
    resolved: &[Resolved<String>],
) -> (Step, Vec<String>) {
    let mut commands = vec![
        format!("export __PROJECT_NAME=\"{}\"", project.name),
        format!("export __REPO=\"{}\"", project.repo),
        format!("export __PIPELINE_NAME=\"{}\"", pipeline.name),
        format!("export __BRANCH=\"{}\"", pipeline.branch),
    ];
    if let Some((owner, name)) = github_owner_and_name(&project.repo) {
        commands.push(format!("export __GITHUB_OWNER=\"{owner}\""));
        commands.push(format!("export __GITHUB_NAME=\"{name}\""));
    }

    let mut cleanup = Vec::new();
    for var in resolved {
        match &var.path {
            None => commands.push(format!("export {}=\"{}\"", var.key, var.value)),
            Some(path) => {
                commands.push(format!("printf '%s' \"{}\" > {path}", var.value));
                commands.push(format!("export {}=\"{}\"", var.key, path));
                cleanup.push(format!("rm -f {path}"));
            }
        }
    }
    (Step::new("variables", commands), cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_ssh_and_https_github_urls() {
        assert_eq!(
            github_owner_and_name("git@github.com:acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            github_owner_and_name("https://github.com/acme/widgets"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(github_owner_and_name("https://gitlab.com/acme/widgets"), None);
    }

    #[test]
    fn unsupported_system_is_rejected() {
        let cfg = PipelineConfig {
            system: "windows".to_string(),
            image: None,
            steps: vec![],
            cleanup: vec![],
        };
        assert!(!cfg.is_supported());
    }
}
