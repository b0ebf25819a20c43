//! Dependency graph over work items.
//!
//! Items live in an arena (the petgraph node list, in insertion order) and
//! dependencies are edges between node indices, so items never hold
//! references to each other and cycle detection is a pure graph algorithm.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::item::{ItemId, WorkItem};
use crate::error::{Error, Result};

/// The dependency graph of one workflow.
///
/// Node `i` corresponds to the `i`-th item passed to [`ItemGraph::build`].
/// An edge `a -> b` means `b` depends on `a`.
pub struct ItemGraph {
    graph: DiGraph<ItemId, ()>,
    index: HashMap<ItemId, NodeIndex>,
}

impl ItemGraph {
    /// Build the graph for a set of items.
    ///
    /// # Errors
    /// - `DuplicateItem` if two items share an id
    /// - `UnknownDependency` if a dependency names an item not in the set
    pub fn build(items: &[WorkItem]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(items.len(), items.len());
        let mut index = HashMap::with_capacity(items.len());

        for item in items {
            if index.contains_key(&item.item_id) {
                return Err(Error::DuplicateItem(item.item_id.clone()));
            }
            let node = graph.add_node(item.item_id.clone());
            index.insert(item.item_id.clone(), node);
        }

        for item in items {
            let to = index[&item.item_id];
            for dependency in &item.dependencies {
                let from = index.get(dependency).ok_or_else(|| Error::UnknownDependency {
                    item: item.item_id.clone(),
                    dependency: dependency.clone(),
                })?;
                graph.update_edge(*from, to, ());
            }
        }

        Ok(Self { graph, index })
    }

    /// Number of items in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    /// Arena position of an item.
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).map(|node| node.index())
    }

    /// Whether the graph contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Positions of the items in a stable topological order.
    ///
    /// Among items whose dependencies are all satisfied, the one added first
    /// comes first, so the order is deterministic for a fixed item set.
    ///
    /// # Errors
    /// Returns `CyclicDependency` naming an item on the cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        if self.is_cyclic() {
            let node = toposort(&self.graph, None)
                .err()
                .map(|cycle| cycle.node_id())
                .unwrap_or_else(|| NodeIndex::new(0));
            let id = self
                .graph
                .node_weight(node)
                .cloned()
                .unwrap_or_else(|| ItemId::from("unknown"));
            return Err(Error::CyclicDependency(id));
        }

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| self.graph.neighbors_directed(node, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| Reverse(position))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(position)) = ready.pop() {
            order.push(position);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(position), Direction::Outgoing)
            {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        Ok(order)
    }

    /// Items the given item depends on directly.
    pub fn dependencies(&self, id: &ItemId) -> Vec<&ItemId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Items that depend directly on the given item.
    pub fn dependents(&self, id: &ItemId) -> Vec<&ItemId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every item that depends on the given item, directly or not.
    pub fn transitive_dependents(&self, id: &ItemId) -> HashSet<ItemId> {
        let mut seen = HashSet::new();
        let Some(&start) = self.index.get(id) else {
            return seen;
        };

        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(self.graph[next].clone()) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    fn neighbors(&self, id: &ItemId, direction: Direction) -> Vec<&ItemId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&ItemId> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| &self.graph[n])
            .collect();
        ids.sort_by_key(|id| self.index[*id].index());
        ids
    }
}

impl std::fmt::Debug for ItemGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemGraph")
            .field("items", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
