//! Dependency graph over registered challenges.
//!
//! Edges run dependency → dependent ("must deploy before"), derived from
//! explicit `depends_on` declarations and from `${challenge.output}`
//! placeholders discovered in raw inputs. Built once per run and read-only
//! afterwards.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{RangeError, Result};
use crate::unit::Challenge;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from the registered challenge set.
    ///
    /// Fails with `UnknownReference` if a declared dependency or an input
    /// placeholder names a challenge that is not registered, and with
    /// `Cycle` (reporting the full cycle path) if the edges do not form a
    /// DAG.
    pub fn build(challenges: &[Challenge]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::with_capacity(challenges.len());

        for c in challenges {
            if index.contains_key(&c.id) {
                return Err(RangeError::DuplicateChallenge(c.id.clone()));
            }
            let idx = graph.add_node(c.id.clone());
            index.insert(c.id.clone(), idx);
        }

        for c in challenges {
            let to = index[&c.id];
            for dep in c.dependency_ids() {
                let Some(&from) = index.get(dep) else {
                    return Err(RangeError::UnknownReference {
                        unit: c.id.clone(),
                        reference: dep.to_string(),
                    });
                };
                // Parallel declared + discovered edges collapse to one.
                if graph.edges_connecting(from, to).next().is_none() {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let built = Self { graph, index };
        if let Some(cycle) = built.find_cycle() {
            return Err(RangeError::Cycle { cycle });
        }
        Ok(built)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.index.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Batches of mutually independent challenges in deploy order: every
    /// challenge appears after all of its dependencies. Within a batch ids
    /// ascend, so logs and scheduling are reproducible.
    pub fn deploy_batches(&self) -> Vec<Vec<String>> {
        self.layered(Direction::Incoming)
    }

    /// Teardown ordering: the exact reverse relation. A challenge appears
    /// only after everything that depends on it.
    pub fn destroy_batches(&self) -> Vec<Vec<String>> {
        self.layered(Direction::Outgoing)
    }

    /// All challenges that transitively depend on `id`, sorted.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.closure(id, Direction::Outgoing)
    }

    /// All challenges `id` transitively depends on, sorted. Used to widen a
    /// single-challenge deploy to everything it needs.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.closure(id, Direction::Incoming)
    }

    /// Kahn's algorithm, layered. `towards` selects which edge direction
    /// counts as a prerequisite: `Incoming` yields deploy order,
    /// `Outgoing` yields destroy order.
    fn layered(&self, towards: Direction) -> Vec<Vec<String>> {
        let mut degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.edges_directed(n, towards).count()))
            .collect();

        let release = match towards {
            Direction::Incoming => Direction::Outgoing,
            Direction::Outgoing => Direction::Incoming,
        };

        let mut ready: Vec<NodeIndex> = degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .collect();

        let mut batches = Vec::new();
        while !ready.is_empty() {
            let mut batch: Vec<String> = ready
                .iter()
                .map(|&n| self.graph[n].clone())
                .collect();
            batch.sort();

            let mut next = Vec::new();
            for &n in &ready {
                for neighbor in self.graph.neighbors_directed(n, release) {
                    let d = degree.get_mut(&neighbor).expect("neighbor is a node");
                    *d -= 1;
                    if *d == 0 {
                        next.push(neighbor);
                    }
                }
            }
            batches.push(batch);
            ready = next;
        }
        batches
    }

    fn closure(&self, id: &str, dir: Direction) -> Vec<String> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(n, dir) {
                if seen.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        let mut out: Vec<String> = seen.into_iter().map(|n| self.graph[n].clone()).collect();
        out.sort();
        out
    }

    /// Depth-first search with an explicit recursion stack; returns the
    /// first cycle found as `[a, b, ..., a]` for diagnostics. Nodes are
    /// visited in ascending id order so the reported cycle is stable.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        let mut marks: HashMap<NodeIndex, Mark> = self
            .graph
            .node_indices()
            .map(|n| (n, Mark::White))
            .collect();

        let mut roots: Vec<NodeIndex> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for root in roots {
            if marks[&root] != Mark::White {
                continue;
            }
            // stack of (node, remaining successors to visit)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
            marks.insert(root, Mark::Grey);
            stack.push((root, self.sorted_successors(root)));

            loop {
                let next = match stack.last_mut() {
                    Some((_, successors)) => successors.pop(),
                    None => break,
                };
                match next {
                    Some(next) => match marks[&next] {
                        Mark::White => {
                            marks.insert(next, Mark::Grey);
                            let succ = self.sorted_successors(next);
                            stack.push((next, succ));
                        }
                        Mark::Grey => {
                            // Found a back edge: the cycle is everything on
                            // the stack from `next` onwards.
                            let pos = stack
                                .iter()
                                .position(|(n, _)| *n == next)
                                .expect("grey node is on the stack");
                            let mut cycle: Vec<String> = stack[pos..]
                                .iter()
                                .map(|(n, _)| self.graph[*n].clone())
                                .collect();
                            cycle.push(self.graph[next].clone());
                            return Some(cycle);
                        }
                        Mark::Black => {}
                    },
                    None => {
                        let (node, _) = stack.pop().expect("loop guard saw a frame");
                        marks.insert(node, Mark::Black);
                    }
                }
            }
        }
        None
    }

    fn sorted_successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut succ: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        // Popped from the back, so sort descending to visit ascending.
        succ.sort_by(|a, b| self.graph[*b].cmp(&self.graph[*a]));
        succ
    }
}
