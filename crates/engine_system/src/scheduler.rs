//! System ordering.
//!
//! The scheduler turns the declared `run_after` relations into one linear
//! execution order:
//!
//! 1. Every declared predecessor must be registered.
//! 2. Kahn's algorithm produces a topological order, always picking the
//!    earliest-registered ready system so the result is deterministic.
//! 3. Left-over systems form at least one cycle, which is reported by name.
//! 4. The order is split into run-once (startup) systems, which run first
//!    during the first tick, and steady-state systems.
//!
//! A startup system may not depend on a steady-state system, since it would
//! otherwise run before its predecessor.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use engine_component::{EcsError, Result};

use crate::config::{SystemConfig, SystemId};

/// The execution order of a set of systems, as indices into the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Run-once systems, in execution order.
    pub startup: Vec<usize>,
    /// Steady-state systems, in execution order.
    pub steady: Vec<usize>,
}

impl Schedule {
    /// The order of the first tick: startup systems, then steady-state ones.
    pub fn first_tick(&self) -> impl Iterator<Item = usize> + '_ {
        self.startup.iter().chain(self.steady.iter()).copied()
    }
}

/// Computes the execution order of `systems`.
///
/// # Errors
///
/// - [`EcsError::MissingSystemDependency`] for a predecessor that is not in
///   `systems`.
/// - [`EcsError::StartupDependency`] for a run-once system ordered after a
///   steady-state system.
/// - [`EcsError::DependencyCycle`] if the relations are cyclic.
pub fn compute_order(systems: &[(SystemId, SystemConfig)]) -> Result<Schedule> {
    let index: HashMap<SystemId, usize> = systems
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i))
        .collect();

    // predecessors[i] = systems that must run before system i.
    let mut predecessors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); systems.len()];
    for (i, (id, config)) in systems.iter().enumerate() {
        for dependency in &config.run_after {
            let Some(&dep) = index.get(dependency) else {
                return Err(EcsError::MissingSystemDependency {
                    system: id.name().to_string(),
                    dependency: dependency.name().to_string(),
                });
            };
            if config.run_once && !systems[dep].1.run_once {
                return Err(EcsError::StartupDependency {
                    system: id.name().to_string(),
                    dependency: dependency.name().to_string(),
                });
            }
            predecessors[i].insert(dep);
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); systems.len()];
    let mut in_degree: Vec<usize> = vec![0; systems.len()];
    for (i, preds) in predecessors.iter().enumerate() {
        in_degree[i] = preds.len();
        for &p in preds {
            successors[p].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..systems.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(systems.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &succ in &successors[next] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() < systems.len() {
        let remaining: BTreeSet<usize> = (0..systems.len()).filter(|&i| in_degree[i] > 0).collect();
        let cycle = find_cycle(&predecessors, &remaining)
            .into_iter()
            .map(|i| systems[i].0.name().to_string())
            .collect();
        return Err(EcsError::DependencyCycle { cycle });
    }

    let (startup, steady): (Vec<usize>, Vec<usize>) =
        order.into_iter().partition(|&i| systems[i].1.run_once);

    debug!(
        startup = ?startup.iter().map(|&i| systems[i].0.name()).collect::<Vec<_>>(),
        steady = ?steady.iter().map(|&i| systems[i].0.name()).collect::<Vec<_>>(),
        "system order computed"
    );
    Ok(Schedule { startup, steady })
}

/// Walks predecessor edges inside `remaining` until a system repeats.
///
/// Returns the cycle in execution direction with the first system repeated
/// at the end (`a -> b -> a`).
fn find_cycle(predecessors: &[BTreeSet<usize>], remaining: &BTreeSet<usize>) -> Vec<usize> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut seen: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(prev) = predecessors[current]
            .iter()
            .copied()
            .find(|p| remaining.contains(p))
        else {
            return path;
        };
        if let Some(&pos) = seen.get(&prev) {
            let mut cycle: Vec<usize> = path[pos..].to_vec();
            cycle.reverse();
            cycle.push(cycle[0]);
            return cycle;
        }
        seen.insert(prev, path.len());
        path.push(prev);
        current = prev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SystemContext;
    use crate::init::SystemInit;
    use crate::system::System;

    macro_rules! test_system {
        ($($name:ident),+) => {
            $(
                struct $name;
                impl System for $name {
                    fn build(_: &mut SystemInit<'_>) -> Result<Self> {
                        Ok(Self)
                    }

                    fn run(&mut self, _: &SystemContext<'_>) -> anyhow::Result<()> {
                        Ok(())
                    }
                }
            )+
        };
    }

    test_system!(Setup, Logic, Mover, Renderer, Hello);

    fn names(systems: &[(SystemId, SystemConfig)], order: &[usize]) -> Vec<&'static str> {
        order.iter().map(|&i| systems[i].0.name()).collect()
    }

    fn entry<S: System>(config: SystemConfig) -> (SystemId, SystemConfig) {
        (SystemId::of::<S>(), config)
    }

    #[test]
    fn test_no_systems_empty_schedule() {
        let schedule = compute_order(&[]).unwrap();
        assert_eq!(schedule, Schedule::default());
    }

    #[test]
    fn test_registration_order_without_dependencies() {
        let systems = vec![
            entry::<Logic>(SystemConfig::new()),
            entry::<Mover>(SystemConfig::new()),
            entry::<Hello>(SystemConfig::new()),
        ];
        let schedule = compute_order(&systems).unwrap();
        assert_eq!(names(&systems, &schedule.steady), vec!["Logic", "Mover", "Hello"]);
    }

    #[test]
    fn test_predecessor_runs_first_regardless_of_registration_order() {
        let forward = vec![
            entry::<Logic>(SystemConfig::new()),
            entry::<Mover>(SystemConfig::new().run_after::<Logic>()),
        ];
        let backward = vec![
            entry::<Mover>(SystemConfig::new().run_after::<Logic>()),
            entry::<Logic>(SystemConfig::new()),
        ];
        for systems in [forward, backward] {
            let schedule = compute_order(&systems).unwrap();
            assert_eq!(names(&systems, &schedule.steady), vec!["Logic", "Mover"]);
        }
    }

    #[test]
    fn test_chain_and_diamond() {
        let systems = vec![
            entry::<Renderer>(SystemConfig::new().run_after::<Mover>().run_after::<Hello>()),
            entry::<Hello>(SystemConfig::new().run_after::<Logic>()),
            entry::<Mover>(SystemConfig::new().run_after::<Logic>()),
            entry::<Logic>(SystemConfig::new()),
        ];
        let schedule = compute_order(&systems).unwrap();
        assert_eq!(
            names(&systems, &schedule.steady),
            vec!["Logic", "Hello", "Mover", "Renderer"]
        );
    }

    #[test]
    fn test_run_once_systems_are_partitioned_first() {
        let systems = vec![
            entry::<Logic>(SystemConfig::new().run_after::<Setup>()),
            entry::<Setup>(SystemConfig::new().run_once()),
            entry::<Hello>(SystemConfig::new()),
        ];
        let schedule = compute_order(&systems).unwrap();
        assert_eq!(names(&systems, &schedule.startup), vec!["Setup"]);
        assert_eq!(names(&systems, &schedule.steady), vec!["Logic", "Hello"]);
        let first: Vec<usize> = schedule.first_tick().collect();
        assert_eq!(names(&systems, &first), vec!["Setup", "Logic", "Hello"]);
    }

    #[test]
    fn test_missing_dependency() {
        let systems = vec![entry::<Mover>(SystemConfig::new().run_after::<Logic>())];
        let err = compute_order(&systems).unwrap_err();
        assert!(matches!(
            err,
            EcsError::MissingSystemDependency { ref system, ref dependency }
                if system == "Mover" && dependency == "Logic"
        ));
    }

    #[test]
    fn test_startup_system_after_steady_system() {
        let systems = vec![
            entry::<Logic>(SystemConfig::new()),
            entry::<Setup>(SystemConfig::new().run_once().run_after::<Logic>()),
        ];
        let err = compute_order(&systems).unwrap_err();
        assert!(matches!(err, EcsError::StartupDependency { .. }));
    }

    #[test]
    fn test_cycle_is_named() {
        let systems = vec![
            entry::<Hello>(SystemConfig::new()),
            entry::<Logic>(SystemConfig::new().run_after::<Mover>()),
            entry::<Mover>(SystemConfig::new().run_after::<Logic>()),
        ];
        let err = compute_order(&systems).unwrap_err();
        assert_eq!(err.to_string(), "system dependency cycle: Mover -> Logic -> Mover");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let systems = vec![entry::<Logic>(SystemConfig::new().run_after::<Logic>())];
        let err = compute_order(&systems).unwrap_err();
        assert_eq!(err.to_string(), "system dependency cycle: Logic -> Logic");
    }

    #[test]
    fn test_duplicate_predecessor_counts_once() {
        let systems = vec![
            entry::<Logic>(SystemConfig::new()),
            entry::<Mover>(SystemConfig::new().run_after::<Logic>().run_after::<Logic>()),
        ];
        let schedule = compute_order(&systems).unwrap();
        assert_eq!(names(&systems, &schedule.steady), vec!["Logic", "Mover"]);
    }
}
