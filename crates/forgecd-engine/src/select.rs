//! Pure worker selector (spec §4.3). Grounded on
//! `original_source/pkg/engine/standalone/selectworkers.go` — no teacher
//! counterpart exists (`buildit-scheduler` is a generic job queue with no
//! worker-matchmaking concept).

use forgecd_core::{Pipeline, PipelineConfig, Worker, WorkerStrategy};

#[derive(Debug, PartialEq, Eq)]
pub enum SelectError {
    /// Stops binding for this tick — no worker capacity exists at all
    /// (spec §4.3 step 1).
    NoAvailableWorker,
    /// Skip this element and try the next one — this element's
    /// configuration is unsatisfiable right now (spec §4.3 step 2).
    NoAvailableWorkerForConfiguration,
}

/// `selectWorker(cfg, workers) → (worker | ErrNoAvailableWorker |
/// ErrNoAvailableWorkerForConfiguration)` (spec §4.3). A pure function:
/// repeated calls with equal inputs return equal outputs (spec §8 — tie-break
/// by name yields a total order).
pub fn select_worker<'a>(
    cfg: &PipelineConfig,
    workers: &'a [Worker],
) -> Result<&'a Worker, SelectError> {
    if workers.is_empty() {
        return Err(SelectError::NoAvailableWorker);
    }

    let mut candidates: Vec<&Worker> = workers
        .iter()
        .filter(|w| {
            w.has_free_capacity()
                && ((!cfg.system.is_empty() && w.is_static && w.system == cfg.system)
                    || (cfg.image.as_deref().is_some_and(|i| !i.is_empty()) && !w.is_static))
        })
        .collect();

    if candidates.is_empty() {
        return Err(SelectError::NoAvailableWorkerForConfiguration);
    }

    candidates.sort_by(|a, b| {
        b.strategy
            .cmp(&a.strategy)
            .then_with(|| a.active_builds.cmp(&b.active_builds))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(candidates[0])
}

pub fn select_worker_for_pipeline<'a>(
    pipeline: &Pipeline,
    workers: &'a [Worker],
) -> Result<&'a Worker, SelectError> {
    select_worker(&pipeline.config, workers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgecd_core::{Step, WorkerStatus};

    fn worker(name: &str, is_static: bool, system: &str, strategy: WorkerStrategy, active: i32, capacity: i32) -> Worker {
        Worker {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            system: system.to_string(),
            username: "build".to_string(),
            is_static,
            status: WorkerStatus::Idle,
            strategy,
            active_builds: active,
            capacity,
        }
    }

    fn linux_config() -> PipelineConfig {
        PipelineConfig {
            system: "linux".to_string(),
            image: None,
            steps: vec![Step::new("build", vec!["echo hi".to_string()])],
            cleanup: vec!["true".to_string()],
        }
    }

    #[test]
    fn empty_workers_stops_the_tick() {
        let cfg = linux_config();
        assert_eq!(select_worker(&cfg, &[]), Err(SelectError::NoAvailableWorker));
    }

    #[test]
    fn unsatisfiable_configuration_is_skippable() {
        let cfg = linux_config();
        let workers = vec![worker("docker1", false, "", WorkerStrategy::Balanced, 0, 4)];
        assert_eq!(
            select_worker(&cfg, &workers),
            Err(SelectError::NoAvailableWorkerForConfiguration)
        );
    }

    #[test]
    fn sorts_by_strategy_then_load_then_name() {
        let cfg = linux_config();
        let workers = vec![
            worker("b", true, "linux", WorkerStrategy::Balanced, 1, 4),
            worker("a", true, "linux", WorkerStrategy::Max, 2, 4),
            worker("c", true, "linux", WorkerStrategy::Max, 1, 4),
        ];
        let picked = select_worker(&cfg, &workers).unwrap();
        assert_eq!(picked.name, "c");
    }

    #[test]
    fn full_capacity_workers_are_excluded() {
        let cfg = linux_config();
        let workers = vec![worker("full", true, "linux", WorkerStrategy::Max, 4, 4)];
        assert_eq!(
            select_worker(&cfg, &workers),
            Err(SelectError::NoAvailableWorkerForConfiguration)
        );
    }
}
