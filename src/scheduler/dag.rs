//! Dependency graph resolution for workflow runs.
//!
//! Builds the adjacency maps from `TaskDependency` edges, rejects cyclic
//! graphs before anything is enqueued, and answers the two questions the
//! scheduler asks while a run progresses: which tasks are runnable now, and
//! which tasks must be failed when an upstream fails.

use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Task, TaskDependency, TaskRunStatus};

/// Directed dependency graph over the tasks of one workflow.
pub struct DependencyGraph {
    task_ids: Vec<Uuid>,
    /// task -> its prerequisites
    upstream: HashMap<Uuid, Vec<Uuid>>,
    /// task -> the tasks that depend on it
    downstream: HashMap<Uuid, Vec<Uuid>>,
}

impl DependencyGraph {
    /// Build the graph. Edges pointing at tasks outside `tasks` are ignored.
    pub fn new(tasks: &[Task], deps: &[TaskDependency]) -> Self {
        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let known: HashSet<Uuid> = task_ids.iter().copied().collect();

        let mut upstream: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut downstream: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for dep in deps {
            if !known.contains(&dep.task_id) || !known.contains(&dep.depends_on_task_id) {
                continue;
            }
            upstream
                .entry(dep.task_id)
                .or_default()
                .push(dep.depends_on_task_id);
            downstream
                .entry(dep.depends_on_task_id)
                .or_default()
                .push(dep.task_id);
        }

        Self {
            task_ids,
            upstream,
            downstream,
        }
    }

    /// Verify the graph is acyclic with a topological pass (Kahn's
    /// algorithm). Must be called before any task run of the containing
    /// workflow run is enqueued.
    pub fn ensure_acyclic(&self) -> Result<()> {
        let mut indegree: HashMap<Uuid, usize> = self
            .task_ids
            .iter()
            .map(|id| (*id, self.upstream.get(id).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<Uuid> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for next in self.downstream_of(id) {
                if let Some(deg) = indegree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if visited != self.task_ids.len() {
            return Err(Error::invalid(
                "workflow dependency graph contains a cycle",
            ));
        }
        Ok(())
    }

    /// Tasks with no upstream dependencies: the initially-runnable set.
    pub fn roots(&self) -> Vec<Uuid> {
        self.task_ids
            .iter()
            .filter(|id| self.upstream.get(id).map_or(true, Vec::is_empty))
            .copied()
            .collect()
    }

    pub fn upstream_of(&self, id: Uuid) -> &[Uuid] {
        self.upstream.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn downstream_of(&self, id: Uuid) -> &[Uuid] {
        self.downstream.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Tasks unblocked by `succeeded` completing: its dependents whose
    /// upstream task runs have all reached `success`, per `statuses`
    /// (keyed by task id).
    pub fn unblocked_by(
        &self,
        succeeded: Uuid,
        statuses: &HashMap<Uuid, TaskRunStatus>,
    ) -> Vec<Uuid> {
        self.downstream_of(succeeded)
            .iter()
            .filter(|candidate| {
                self.upstream_of(**candidate).iter().all(|up| {
                    statuses
                        .get(up)
                        .is_some_and(|s| s.satisfies_dependencies())
                })
            })
            .copied()
            .collect()
    }

    /// Every task reachable downstream of `failed`, in BFS order. Used to
    /// cascade a failure without enqueueing anything.
    pub fn transitive_downstream(&self, failed: Uuid) -> Vec<Uuid> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<Uuid> = self.downstream_of(failed).iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(self.downstream_of(id).iter().copied());
        }
        order
    }
}
