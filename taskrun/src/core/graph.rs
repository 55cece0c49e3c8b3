//! Deterministic dependency ordering for plan steps.
//!
//! Ordering uses Kahn's algorithm with ties broken by declaration order, so
//! the same plan always executes in the same order. Only `dependsOn` edges
//! are considered: two steps touching the same path are not ordered unless
//! one declares the other.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use crate::plan::{Step, StepId};

/// Failure to order a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The named steps form a cycle; the first id is repeated at the end.
    Cycle(Vec<StepId>),
    /// A step depends on an id that is not in the plan.
    UnknownDependency { step: StepId, missing: StepId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Cycle(cycle) => {
                let rendered: Vec<String> = cycle.iter().map(ToString::to_string).collect();
                write!(f, "dependency cycle: {}", rendered.join(" -> "))
            }
            GraphError::UnknownDependency { step, missing } => {
                write!(f, "step {step} depends on unknown step {missing}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Return step ids in an order consistent with every `dependsOn` edge.
pub fn topological_order(steps: &[Step]) -> Result<Vec<StepId>, GraphError> {
    let index_of: HashMap<StepId, usize> = steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.id, idx))
        .collect();

    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let Some(&dep_idx) = index_of.get(dep) else {
                return Err(GraphError::UnknownDependency {
                    step: step.id,
                    missing: *dep,
                });
            };
            in_degree[idx] += 1;
            dependents[dep_idx].push(idx);
        }
    }

    // Min-heap on declaration index keeps independent steps in source order.
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(steps[idx].id);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < steps.len() {
        let remaining: Vec<usize> = (0..steps.len()).filter(|idx| in_degree[*idx] > 0).collect();
        return Err(GraphError::Cycle(find_cycle(steps, &index_of, &remaining)));
    }
    Ok(order)
}

/// Reorder `steps` into execution order.
pub fn order_steps(steps: &[Step]) -> Result<Vec<Step>, GraphError> {
    let order = topological_order(steps)?;
    let by_id: HashMap<StepId, &Step> = steps.iter().map(|step| (step.id, step)).collect();
    Ok(order
        .into_iter()
        .filter_map(|id| by_id.get(&id).map(|step| (*step).clone()))
        .collect())
}

/// Walk dependency edges among the unresolved steps until a step repeats.
///
/// Every unresolved step has at least one unresolved dependency, so the walk
/// always closes a cycle.
fn find_cycle(steps: &[Step], index_of: &HashMap<StepId, usize>, remaining: &[usize]) -> Vec<StepId> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let unresolved = |idx: usize| remaining.contains(&idx);

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = path.iter().position(|idx| *idx == current) {
            let mut cycle: Vec<StepId> = path[pos..].iter().map(|idx| steps[*idx].id).collect();
            cycle.push(steps[current].id);
            return cycle;
        }
        path.push(current);
        let next = steps[current]
            .depends_on
            .iter()
            .filter_map(|dep| index_of.get(dep).copied())
            .find(|idx| unresolved(*idx));
        match next {
            Some(idx) => current = idx,
            None => return path.iter().map(|idx| steps[*idx].id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Action;
    use std::collections::BTreeSet;

    fn step(id: StepId, deps: &[StepId]) -> Step {
        Step {
            id,
            action: Action::Run,
            path: None,
            command: Some(format!("echo {id}")),
            prompt: None,
            description: format!("step {id}"),
            depends_on: deps.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn independent_steps_keep_declaration_order() {
        let steps = vec![step(3, &[]), step(1, &[]), step(2, &[])];
        assert_eq!(topological_order(&steps).expect("order"), vec![3, 1, 2]);
    }

    #[test]
    fn dependencies_run_first() {
        let steps = vec![step(1, &[3]), step(2, &[]), step(3, &[2])];
        assert_eq!(topological_order(&steps).expect("order"), vec![2, 3, 1]);
    }

    #[test]
    fn ties_after_release_prefer_earlier_declaration() {
        let steps = vec![step(10, &[30]), step(20, &[]), step(30, &[]), step(40, &[30])];
        assert_eq!(topological_order(&steps).expect("order"), vec![20, 30, 10, 40]);
    }

    #[test]
    fn cycle_is_named() {
        let steps = vec![step(1, &[]), step(2, &[4]), step(3, &[2]), step(4, &[3])];
        let err = topological_order(&steps).expect_err("cycle");
        let GraphError::Cycle(cycle) = err else {
            panic!("expected cycle error");
        };
        assert_eq!(cycle.first(), cycle.last());
        for id in [2, 3, 4] {
            assert!(cycle.contains(&id));
        }
        assert!(!cycle.contains(&1));
    }

    #[test]
    fn unknown_dependency_is_reported() {
        let steps = vec![step(1, &[7])];
        assert_eq!(
            topological_order(&steps),
            Err(GraphError::UnknownDependency {
                step: 1,
                missing: 7
            })
        );
    }

    #[test]
    fn ordering_is_idempotent() {
        let steps = vec![step(5, &[]), step(4, &[5]), step(9, &[]), step(1, &[4, 9])];
        let once = order_steps(&steps).expect("first pass");
        let twice = order_steps(&once).expect("second pass");
        assert_eq!(once, twice);
    }
}
