//! Task graph construction and wave computation.
//!
//! The builder takes the task descriptors returned by decomposition and
//! constructs a validated DAG. Waves are topological levels: a task's wave is
//! one more than the deepest of its dependencies.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::errors::GraphError;
use crate::graph::task::{TaskId, TaskSpec};

/// Index into the task list.
pub type TaskIndex = usize;

/// A validated directed acyclic graph of tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Tasks indexed by their position
    tasks: Vec<TaskSpec>,
    /// Map from task id to index
    index_map: HashMap<TaskId, TaskIndex>,
    /// index -> tasks that depend on it
    forward_edges: Vec<Vec<TaskIndex>>,
    /// index -> tasks it depends on
    reverse_edges: Vec<Vec<TaskIndex>>,
    /// Topological level per index
    levels: Vec<usize>,
}

impl TaskGraph {
    /// Build and validate the graph.
    ///
    /// Fails on duplicate ids, dependencies naming unknown tasks, and cycles.
    pub fn build(tasks: Vec<TaskSpec>) -> Result<Self, GraphError> {
        let mut index_map = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index_map.insert(task.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask(task.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); tasks.len()];

        for (to_idx, task) in tasks.iter().enumerate() {
            // Repeated entries in a dependency list collapse to one edge
            let mut seen = HashSet::new();
            for dep in &task.dependencies {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| GraphError::DanglingDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        })?;
                if seen.insert(from_idx) {
                    forward_edges[from_idx].push(to_idx);
                    reverse_edges[to_idx].push(from_idx);
                }
            }
        }

        let levels = Self::compute_levels(&tasks, &forward_edges, &reverse_edges)?;

        Ok(Self {
            tasks,
            index_map,
            forward_edges,
            reverse_edges,
            levels,
        })
    }

    /// Kahn's algorithm. Assigns each node its level and reports every node
    /// left with unresolved in-edges as part of a cycle.
    fn compute_levels(
        tasks: &[TaskSpec],
        forward_edges: &[Vec<TaskIndex>],
        reverse_edges: &[Vec<TaskIndex>],
    ) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = reverse_edges.iter().map(|deps| deps.len()).collect();
        let mut levels = vec![0usize; tasks.len()];

        let mut queue: VecDeque<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop_front() {
            processed += 1;
            for &dependent in &forward_edges[node] {
                levels[dependent] = levels[dependent].max(levels[node] + 1);
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if processed != tasks.len() {
            let mut involved: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| tasks[i].id.clone())
                .collect();
            involved.sort();
            return Err(GraphError::Cycle { involved });
        }

        Ok(levels)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All task descriptors in insertion order.
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&TaskSpec> {
        self.index_map.get(id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_map.contains_key(id)
    }

    /// Topological level of a task.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.index_map.get(id).map(|&i| self.levels[i])
    }

    /// Number of waves (0 for an empty graph).
    pub fn wave_count(&self) -> usize {
        self.levels.iter().max().map_or(0, |max| max + 1)
    }

    /// Task ids grouped by wave. Ids are sorted within a wave so repeated
    /// computation over the same graph yields the same order.
    pub fn waves(&self) -> Vec<Vec<TaskId>> {
        let mut waves: Vec<Vec<TaskId>> = vec![Vec::new(); self.wave_count()];
        for (i, task) in self.tasks.iter().enumerate() {
            waves[self.levels[i]].push(task.id.clone());
        }
        for wave in &mut waves {
            wave.sort();
        }
        waves
    }

    /// Direct dependencies of a task.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.edges_of(id, &self.reverse_edges)
    }

    /// Tasks that depend directly on the given task.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.edges_of(id, &self.forward_edges)
    }

    fn edges_of<'a>(&'a self, id: &str, edges: &'a [Vec<TaskIndex>]) -> Vec<&'a str> {
        self.index_map
            .get(id)
            .map(|&i| {
                edges[i]
                    .iter()
                    .map(|&j| self.tasks[j].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Transitive closure of `dependents`, sorted.
    pub fn downstream(&self, id: &str) -> Vec<TaskId> {
        let Some(&start) = self.index_map.get(id) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dependent in &self.forward_edges[node] {
                if seen.insert(self.tasks[dependent].id.clone()) {
                    stack.push(dependent);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| self.tasks[i].id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: Vec<&str>) -> TaskSpec {
        TaskSpec::new(
            id,
            &format!("Task {}", id),
            &format!("Do {}", id),
            deps.into_iter().map(String::from).collect(),
        )
    }

    #[test]
    fn test_build_simple_graph() {
        let graph = TaskGraph::build(vec![
            task("a", vec![]),
            task("b", vec!["a"]),
            task("c", vec!["a"]),
            task("d", vec!["b", "c"]),
        ])
        .unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots(), vec!["a"]);
        assert_eq!(graph.wave_of("d"), Some(2));
    }

    #[test]
    fn test_waves_sorted_within_level() {
        let graph = TaskGraph::build(vec![
            task("root", vec![]),
            task("zeta", vec!["root"]),
            task("alpha", vec!["root"]),
            task("mid", vec!["root"]),
        ])
        .unwrap();

        let waves = graph.waves();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0], vec!["root"]);
        assert_eq!(waves[1], vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_wave_is_one_more_than_deepest_dependency() {
        // d depends on a (wave 0) and c (wave 2), so it lands in wave 3
        let graph = TaskGraph::build(vec![
            task("a", vec![]),
            task("b", vec!["a"]),
            task("c", vec!["b"]),
            task("d", vec!["a", "c"]),
        ])
        .unwrap();

        assert_eq!(graph.wave_of("d"), Some(3));
        for spec in graph.tasks() {
            for dep in &spec.dependencies {
                assert!(graph.wave_of(&spec.id) > graph.wave_of(dep));
            }
        }
    }

    #[test]
    fn test_waves_are_deterministic() {
        let specs = vec![
            task("c", vec![]),
            task("b", vec![]),
            task("a", vec!["b", "c"]),
        ];
        let first = TaskGraph::build(specs.clone()).unwrap().waves();
        let second = TaskGraph::build(specs).unwrap().waves();
        assert_eq!(first, second);
        assert_eq!(first[0], vec!["b", "c"]);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = TaskGraph::build(vec![
            task("a", vec![]),
            task("b", vec!["a"]),
            task("c", vec!["a"]),
        ])
        .unwrap();

        assert!(graph.dependencies("a").is_empty());
        assert_eq!(graph.dependencies("b"), vec!["a"]);
        let dependents = graph.dependents("a");
        assert!(dependents.contains(&"b"));
        assert!(dependents.contains(&"c"));
        assert!(graph.dependents("missing").is_empty());
    }

    #[test]
    fn test_downstream_is_transitive() {
        let graph = TaskGraph::build(vec![
            task("a", vec![]),
            task("b", vec!["a"]),
            task("c", vec!["b"]),
            task("d", vec![]),
        ])
        .unwrap();

        assert_eq!(graph.downstream("a"), vec!["b", "c"]);
        assert!(graph.downstream("d").is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        let result = TaskGraph::build(vec![
            task("a", vec!["c"]),
            task("b", vec!["a"]),
            task("c", vec!["b"]),
            task("free", vec![]),
        ]);

        match result {
            Err(GraphError::Cycle { involved }) => {
                assert_eq!(involved, vec!["a", "b", "c"]);
            }
            other => panic!("Expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = TaskGraph::build(vec![task("a", vec!["a"])]);
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_missing_dependency() {
        let result = TaskGraph::build(vec![task("a", vec!["nonexistent"])]);
        assert_eq!(
            result.unwrap_err(),
            GraphError::DanglingDependency {
                task: "a".into(),
                dependency: "nonexistent".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_task_id() {
        let result = TaskGraph::build(vec![task("a", vec![]), task("a", vec![])]);
        assert_eq!(result.unwrap_err(), GraphError::DuplicateTask("a".into()));
    }

    #[test]
    fn test_repeated_dependency_collapses() {
        let graph = TaskGraph::build(vec![task("a", vec![]), task("b", vec!["a", "a"])]).unwrap();
        assert_eq!(graph.dependencies("b"), vec!["a"]);
        assert_eq!(graph.dependents("a"), vec!["b"]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::build(vec![]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.waves().is_empty());
        assert_eq!(graph.wave_count(), 0);
    }
}
