//! Rendering adjacency for resolved flows.
//!
//! Every job gets the set of jobs drawn immediately before it. Inside a
//! serial group each element follows the previous one; inside a parallel
//! group every element shares the incoming predecessors and all of them
//! together precede whatever comes next.

use crate::error::TopologyError;
use flowwatch_core::JobNode;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A job as seen by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderNode {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub labeled_by: Option<String>,
    pub previous: BTreeSet<String>,
}

/// Rendering key to job and predecessors, for one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderMap {
    nodes: BTreeMap<String, RenderNode>,
}

impl RenderMap {
    /// Compute predecessors for every job under `root`.
    ///
    /// The jobs' `previous` sets are filled in place so the live topology
    /// and the map agree.
    pub fn generate(root: &mut JobNode) -> Self {
        let mut map = Self::default();
        link(root, Vec::new(), &mut map.nodes);
        map
    }

    pub fn get(&self, key: &str) -> Option<&RenderNode> {
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RenderNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Jobs drawn first (no predecessors).
    pub fn roots(&self) -> Vec<&RenderNode> {
        self.nodes
            .values()
            .filter(|node| node.previous.is_empty())
            .collect()
    }

    /// Jobs sorted so that every job comes after its predecessors.
    pub fn topological_order(&self) -> Result<Vec<&RenderNode>, TopologyError> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();

        for key in self.nodes.keys() {
            index.insert(key.as_str(), graph.add_node(key.as_str()));
        }
        for node in self.nodes.values() {
            let to = index[node.key.as_str()];
            for prev in &node.previous {
                if let Some(&from) = index.get(prev.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        toposort(&graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| graph.node_weight(idx))
                    .filter_map(|key| self.nodes.get(*key))
                    .collect()
            })
            .map_err(|_| TopologyError::CycleDetected)
    }
}

/// Link `node` after `previous`; returns the keys that precede the next node.
fn link(
    node: &mut JobNode,
    previous: Vec<String>,
    nodes: &mut BTreeMap<String, RenderNode>,
) -> Vec<String> {
    match node {
        JobNode::Job(job) => {
            job.previous = previous.into_iter().collect();
            nodes.insert(
                job.key.clone(),
                RenderNode {
                    key: job.key.clone(),
                    name: job.name.clone(),
                    description: job.description.clone(),
                    labeled_by: job.labeled_by.clone(),
                    previous: job.previous.clone(),
                },
            );
            vec![job.key.clone()]
        }
        JobNode::Serial(children) => children
            .iter_mut()
            .fold(previous, |prev, child| link(child, prev, nodes)),
        JobNode::Parallel(children) => {
            let mut tails = Vec::new();
            for child in children.iter_mut() {
                tails.extend(link(child, previous.clone(), nodes));
            }
            tails
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowwatch_core::Job;
    use pretty_assertions::assert_eq;

    fn job(key: &str) -> JobNode {
        JobNode::Job(Job::new(key, key))
    }

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_serial_chain() {
        let mut root = JobNode::Serial(vec![JobNode::Serial(vec![job("a"), job("b"), job("c")])]);
        let map = RenderMap::generate(&mut root);

        assert_eq!(map.get("a").unwrap().previous, set(&[]));
        assert_eq!(map.get("b").unwrap().previous, set(&["a"]));
        assert_eq!(map.get("c").unwrap().previous, set(&["b"]));
    }

    #[test]
    fn test_parallel_fan_out_and_in() {
        let mut root = JobNode::Serial(vec![
            JobNode::Serial(vec![job("build")]),
            JobNode::Parallel(vec![job("unit"), job("lint")]),
            JobNode::Serial(vec![job("deploy")]),
        ]);
        let map = RenderMap::generate(&mut root);

        assert_eq!(map.get("unit").unwrap().previous, set(&["build"]));
        assert_eq!(map.get("lint").unwrap().previous, set(&["build"]));
        assert_eq!(map.get("deploy").unwrap().previous, set(&["unit", "lint"]));
        assert_eq!(map.roots().len(), 1);
    }

    #[test]
    fn test_nested_serial_inside_parallel() {
        let mut root = JobNode::Serial(vec![
            JobNode::Serial(vec![job("start")]),
            JobNode::Parallel(vec![
                JobNode::Serial(vec![job("x1"), job("x2")]),
                job("y"),
            ]),
            JobNode::Serial(vec![job("end")]),
        ]);
        let map = RenderMap::generate(&mut root);

        assert_eq!(map.get("x1").unwrap().previous, set(&["start"]));
        assert_eq!(map.get("x2").unwrap().previous, set(&["x1"]));
        assert_eq!(map.get("y").unwrap().previous, set(&["start"]));
        assert_eq!(map.get("end").unwrap().previous, set(&["x2", "y"]));
    }

    #[test]
    fn test_live_jobs_receive_predecessors() {
        let mut root = JobNode::Serial(vec![JobNode::Serial(vec![job("a"), job("b")])]);
        RenderMap::generate(&mut root);
        let jobs = root.jobs();
        assert_eq!(jobs[1].previous, set(&["a"]));
    }

    #[test]
    fn test_topological_order() {
        let mut root = JobNode::Serial(vec![
            JobNode::Parallel(vec![job("p"), job("q")]),
            JobNode::Serial(vec![job("r")]),
        ]);
        let map = RenderMap::generate(&mut root);
        let order: Vec<_> = map
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|n| n.key.as_str())
            .collect();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&"r"));
    }
}
