//! DependencyResolver - pure dependency-graph logic, no I/O.
//!
//! Given a set of apps in a batch and, for each, its raw dependency list,
//! this module normalizes, validates acyclicity, and computes readiness.
//! Everything here is a plain function so it can be unit tested without a
//! Store, a driver, or a clock - business logic with no external I/O.

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::domain::{Phase, ReleaseAppStatus};
use crate::error::PreconditionError;

/// Drop non-positive (nil) ids, de-duplicate preserving first occurrence,
/// then sort ascending for stable storage/equality.
pub fn normalize_deps(raw: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for id in raw {
        if id.is_nil() {
            continue;
        }
        if seen.insert(*id) {
            deduped.push(*id);
        }
    }
    deduped.sort();
    deduped
}

/// `effectiveDeps(a) = raw_deps(a) ∩ S`, preserving `raw_deps`' order and
/// de-duplicating.
pub fn effective_deps(raw: &[Uuid], in_batch: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter(|id| in_batch.contains(id) && seen.insert(**id))
        .copied()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS white/gray/black coloring cycle check over `S` using `deps_of`.
/// Returns `Ok(())` if acyclic, or a `CycleDetected` error naming the path.
pub fn validate_graph<F>(apps: &[Uuid], deps_of: F) -> Result<(), PreconditionError>
where
    F: Fn(Uuid) -> Vec<Uuid>,
{
    let mut color: HashMap<Uuid, Color> = apps.iter().map(|a| (*a, Color::White)).collect();
    let mut path: Vec<Uuid> = Vec::new();

    fn visit<F>(
        node: Uuid,
        color: &mut HashMap<Uuid, Color>,
        deps_of: &F,
        path: &mut Vec<Uuid>,
    ) -> Result<(), PreconditionError>
    where
        F: Fn(Uuid) -> Vec<Uuid>,
    {
        color.insert(node, Color::Gray);
        path.push(node);

        for dep in deps_of(node) {
            match color.get(&dep).copied().unwrap_or(Color::White) {
                Color::White => visit(dep, color, deps_of, path)?,
                Color::Gray => {
                    let mut cycle_path: Vec<String> =
                        path.iter().map(|id| id.to_string()).collect();
                    cycle_path.push(dep.to_string());
                    return Err(PreconditionError::CycleDetected(cycle_path.join(" -> ")));
                }
                Color::Black => {}
            }
        }

        path.pop();
        color.insert(node, Color::Black);
        Ok(())
    }

    for app in apps {
        if color.get(app).copied().unwrap_or(Color::White) == Color::White {
            visit(*app, &mut color, &deps_of, &mut path)?;
        }
    }
    Ok(())
}

/// Per-env deployment outcome used for readiness comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnvOutcome {
    NotStarted,
    Triggered,
    Deployed,
    Failed,
}

/// App `a` is ready at env `E` iff every `b` in `effectiveDeps(a)` has
/// reached `Deployed` at `E`.
pub fn ready_for_env(deps: &[Uuid], outcomes: &HashMap<Uuid, EnvOutcome>) -> bool {
    deps.iter()
        .all(|dep| matches!(outcomes.get(dep), Some(EnvOutcome::Deployed)))
}

/// Validate a candidate `tempDependsOn` update in isolation: no self-dependency, every dep present in the
/// batch. Cycle-checking against the rest of the batch is the caller's job
/// via `validate_graph` since it needs the other apps' effective deps too.
pub fn validate_temp_deps(
    release_app_id_app: Uuid,
    new_temp_deps: &[Uuid],
    apps_in_batch: &BTreeSet<Uuid>,
) -> Result<Vec<Uuid>, PreconditionError> {
    let normalized = normalize_deps(new_temp_deps);
    for dep in &normalized {
        if *dep == release_app_id_app {
            return Err(PreconditionError::SelfDependency(*dep));
        }
        if !apps_in_batch.contains(dep) {
            return Err(PreconditionError::DependencyOutsideBatch(*dep));
        }
    }
    Ok(normalized)
}

/// Map a `ReleaseAppStatus` to its `EnvOutcome` at a given phase (used to
/// decide whether dependents are unblocked).
pub fn env_outcome(status: ReleaseAppStatus, phase: Phase) -> EnvOutcome {
    use ReleaseAppStatus::*;
    match phase {
        Phase::Pre => match status {
            Pending | Tagged | PreWaiting | PreCanTrigger => EnvOutcome::NotStarted,
            PreTriggered => EnvOutcome::Triggered,
            PreFailed => EnvOutcome::Failed,
            PreDeployed | ProdWaiting | ProdCanTrigger | ProdTriggered | ProdDeployed
            | ProdFailed => EnvOutcome::Deployed,
        },
        Phase::Prod => match status {
            Pending | Tagged | PreWaiting | PreCanTrigger | PreTriggered | PreDeployed
            | PreFailed | ProdWaiting | ProdCanTrigger => EnvOutcome::NotStarted,
            ProdTriggered => EnvOutcome::Triggered,
            ProdFailed => EnvOutcome::Failed,
            ProdDeployed => EnvOutcome::Deployed,
        },
    }
}

/// Whether a release app in this status is allowed to have one of its
/// `phase` deployments claimed by the dispatcher.
pub fn is_dispatchable(status: ReleaseAppStatus, phase: Phase) -> bool {
    use ReleaseAppStatus::*;
    match phase {
        Phase::Pre => matches!(status, PreCanTrigger | PreTriggered),
        Phase::Prod => matches!(status, ProdCanTrigger | ProdTriggered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn normalize_drops_nil_dedupes_and_sorts() {
        let raw = vec![id(3), id(1), id(3), Uuid::nil(), id(2)];
        assert_eq!(normalize_deps(&raw), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn validate_graph_accepts_dag() {
        // a2 depends on a1
        let apps = vec![id(1), id(2)];
        let deps = |n: Uuid| -> Vec<Uuid> {
            if n == id(2) {
                vec![id(1)]
            } else {
                vec![]
            }
        };
        assert!(validate_graph(&apps, deps).is_ok());
    }

    #[test]
    fn validate_graph_rejects_cycle() {
        let apps = vec![id(1), id(2)];
        let deps = |n: Uuid| -> Vec<Uuid> {
            if n == id(1) {
                vec![id(2)]
            } else {
                vec![id(1)]
            }
        };
        assert!(validate_graph(&apps, deps).is_err());
    }

    #[test]
    fn ready_for_env_requires_all_deps_deployed() {
        let mut outcomes = HashMap::new();
        outcomes.insert(id(1), EnvOutcome::Deployed);
        outcomes.insert(id(2), EnvOutcome::Triggered);

        assert!(ready_for_env(&[id(1)], &outcomes));
        assert!(!ready_for_env(&[id(1), id(2)], &outcomes));
        assert!(ready_for_env(&[], &outcomes));
    }

    #[test]
    fn validate_temp_deps_rejects_self_and_outside_batch() {
        let batch: BTreeSet<Uuid> = [id(1), id(2)].into_iter().collect();
        assert!(validate_temp_deps(id(1), &[id(1)], &batch).is_err());
        assert!(validate_temp_deps(id(1), &[id(9)], &batch).is_err());
        assert!(validate_temp_deps(id(1), &[id(2)], &batch).is_ok());
    }
}
