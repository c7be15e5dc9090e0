// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency scheduling and cycle detection.
//!
//! Walks the graph from a set of root lines and produces a leaves-first
//! order of every reachable non-singleton node. Each node gets the maximum
//! depth at which any root reaches it; sorting by that depth descending
//! (ties by name) puts every producer before all of its consumers.
//!
//! Cycles are found with a three-colour depth-first walk: reaching a node
//! that is still on the walk stack is a back edge. Every node is expanded
//! at most once and every input inspected once per expansion, so the walk
//! is bounded by the total number of inputs even for malformed graphs.

use crate::data_line::DataLine;
use crate::error::{MaterialError, Result};
use crate::graph::MaterialGraph;
use crate::node::{Node, NodeId};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Leaves-first order of the nodes reachable from a set of roots
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    order: Vec<NodeId>,
    singletons: Vec<NodeId>,
    depths: HashMap<NodeId, usize>,
}

impl Schedule {
    /// Non-singleton nodes, deepest first
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Singleton nodes reached from the roots, by name
    pub fn singletons(&self) -> &[NodeId] {
        &self.singletons
    }

    /// Maximum depth at which a root reaches `node`
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        self.depths.get(&node).copied()
    }

    /// Position of `node` in the order
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|id| *id == node)
    }

    /// Whether `node` is scheduled
    pub fn contains(&self, node: NodeId) -> bool {
        self.depths.contains_key(&node)
    }

    /// Number of scheduled nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Schedules nodes of one graph
pub struct Scheduler<'g> {
    graph: &'g MaterialGraph,
}

impl<'g> Scheduler<'g> {
    /// Create a scheduler over `graph`
    pub fn new(graph: &'g MaterialGraph) -> Self {
        Self { graph }
    }

    /// Schedule everything reachable from unlabelled roots
    pub fn schedule<'a>(&self, roots: impl IntoIterator<Item = &'a DataLine>) -> Result<Schedule> {
        self.schedule_labeled(roots.into_iter().map(|line| ("material output", line)))
    }

    /// Schedule everything reachable from roots labelled for diagnostics
    pub fn schedule_labeled<'a>(
        &self,
        roots: impl IntoIterator<Item = (&'a str, &'a DataLine)>,
    ) -> Result<Schedule> {
        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut postorder = Vec::new();
        let mut root_nodes = Vec::new();
        let mut singletons = Vec::new();

        for (label, line) in roots {
            let Some(root) = self.resolve(label, line)? else {
                continue;
            };
            if self.is_singleton(root) {
                singletons.push(root);
                continue;
            }
            root_nodes.push(root);
            if !marks.contains_key(&root) {
                self.walk(root, &mut marks, &mut postorder, &mut singletons)?;
            }
        }

        // Reverse postorder visits consumers before producers, so a node's
        // depth is final by the time it is propagated to its inputs.
        let mut depths: HashMap<NodeId, usize> = root_nodes.iter().map(|id| (*id, 0)).collect();
        for id in postorder.iter().rev() {
            let depth = depths.get(id).copied().unwrap_or(0);
            let Some(node) = self.graph.node(*id) else {
                continue;
            };
            for (producer, _) in node.inputs().iter().filter_map(DataLine::as_output) {
                if self.is_singleton(producer) {
                    continue;
                }
                let entry = depths.entry(producer).or_insert(0);
                *entry = (*entry).max(depth + 1);
            }
        }

        let mut order = postorder;
        order.sort_by_cached_key(|id| (Reverse(depths.get(id).copied().unwrap_or(0)), self.graph.display_name(*id)));

        singletons.sort_by_cached_key(|id| self.graph.display_name(*id));
        singletons.dedup();

        tracing::debug!(
            "Scheduled {} node(s), {} singleton(s), max depth {}",
            order.len(),
            singletons.len(),
            depths.values().max().copied().unwrap_or(0)
        );

        Ok(Schedule {
            order,
            singletons,
            depths,
        })
    }

    /// Resolve a line to the node it references, checking the output index
    fn resolve(&self, consumer: &str, line: &DataLine) -> Result<Option<NodeId>> {
        let Some((producer, index)) = line.as_output() else {
            return Ok(None);
        };
        let node = self.graph.node(producer).ok_or_else(|| MaterialError::DanglingReference {
            consumer: consumer.to_string(),
            missing: self.graph.display_name(producer),
        })?;
        if index >= node.output_count() {
            return Err(MaterialError::InvalidOutput {
                consumer: consumer.to_string(),
                producer: node.name().to_string(),
                index,
                count: node.output_count(),
            });
        }
        Ok(Some(producer))
    }

    fn is_singleton(&self, id: NodeId) -> bool {
        self.graph.node(id).is_some_and(Node::is_singleton)
    }

    fn walk(
        &self,
        root: NodeId,
        marks: &mut HashMap<NodeId, Mark>,
        postorder: &mut Vec<NodeId>,
        singletons: &mut Vec<NodeId>,
    ) -> Result<()> {
        // Explicit stack of (node, next input to inspect).
        let mut stack = vec![(root, 0usize)];
        marks.insert(root, Mark::InProgress);

        while let Some((id, next)) = stack.last_mut() {
            let id = *id;
            let Some(node) = self.graph.node(id) else {
                stack.pop();
                continue;
            };
            let Some(line) = node.inputs().get(*next) else {
                stack.pop();
                marks.insert(id, Mark::Done);
                postorder.push(id);
                continue;
            };
            *next += 1;

            let Some(producer) = self.resolve(node.name(), line)? else {
                continue;
            };
            if self.is_singleton(producer) {
                singletons.push(producer);
                continue;
            }
            match marks.get(&producer) {
                Some(Mark::InProgress) => {
                    return Err(MaterialError::InfiniteLoop {
                        consumer: node.name().to_string(),
                        producer: self.graph.display_name(producer),
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(producer, Mark::InProgress);
                    stack.push((producer, 0));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Arithmetic, ArithmeticOp, BuiltInValue, Parameter};

    fn add(graph: &mut MaterialGraph, name: &str, a: DataLine, b: DataLine) -> NodeId {
        graph
            .add_node(name, Arithmetic::new(ArithmeticOp::Add), vec![a, b])
            .unwrap()
    }

    fn assert_topological(graph: &MaterialGraph, schedule: &Schedule) {
        for id in schedule.order() {
            let consumer = schedule.position(*id).unwrap();
            for (producer, _) in graph.node(*id).unwrap().inputs().iter().filter_map(DataLine::as_output) {
                if let Some(position) = schedule.position(producer) {
                    assert!(position < consumer, "producer scheduled after consumer");
                }
            }
        }
    }

    #[test]
    fn test_leaves_first_order() {
        let mut graph = MaterialGraph::new();
        let p = graph.add_node("p", Parameter::new(1), vec![]).unwrap();
        let b = add(&mut graph, "b", DataLine::node(p), DataLine::scalar(1.0).unwrap());
        let a = add(&mut graph, "a", DataLine::node(b), DataLine::node(p));

        let schedule = Scheduler::new(&graph).schedule([&DataLine::node(a)]).unwrap();
        assert_eq!(schedule.order(), &[p, b, a]);
        assert_eq!(schedule.depth(a), Some(0));
        assert_eq!(schedule.depth(b), Some(1));
        // p is reached at depth 1 from a and depth 2 through b
        assert_eq!(schedule.depth(p), Some(2));
        assert_topological(&graph, &schedule);
    }

    #[test]
    fn test_diamond_is_scheduled_once() {
        let mut graph = MaterialGraph::new();
        let x = graph.add_node("x", Parameter::new(4), vec![]).unwrap();
        let left = add(&mut graph, "left", DataLine::node(x), DataLine::scalar(1.0).unwrap());
        let right = add(&mut graph, "right", DataLine::node(x), DataLine::scalar(2.0).unwrap());
        let top = add(&mut graph, "top", DataLine::node(left), DataLine::node(right));

        let roots = [DataLine::node(top), DataLine::node(x)];
        let schedule = Scheduler::new(&graph).schedule(&roots).unwrap();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.order().iter().filter(|id| **id == x).count(), 1);
        assert_eq!(schedule.order()[0], x);
        // ties at the same depth are broken by name
        assert_eq!(&schedule.order()[1..3], &[left, right]);
        assert_topological(&graph, &schedule);
    }

    #[test]
    fn test_repeated_input_is_not_a_cycle() {
        let mut graph = MaterialGraph::new();
        let b = graph.add_node("B", Parameter::new(2), vec![]).unwrap();
        let a = add(&mut graph, "A", DataLine::node(b), DataLine::node(b));

        let schedule = Scheduler::new(&graph).schedule([&DataLine::node(a)]).unwrap();
        assert_eq!(schedule.order(), &[b, a]);
    }

    #[test]
    fn test_two_node_cycle() {
        let mut graph = MaterialGraph::new();
        let b = add(&mut graph, "B", DataLine::scalar(1.0).unwrap(), DataLine::scalar(2.0).unwrap());
        let a = add(&mut graph, "A", DataLine::node(b), DataLine::scalar(3.0).unwrap());
        graph.set_input(b, 0, DataLine::node(a)).unwrap();

        let err = Scheduler::new(&graph).schedule([&DataLine::node(a)]).unwrap_err();
        let MaterialError::InfiniteLoop { consumer, producer } = &err else {
            panic!("expected infinite loop, got {err}");
        };
        assert_eq!((consumer.as_str(), producer.as_str()), ("B", "A"));
        let message = err.to_string();
        assert!(message.contains("'A'") && message.contains("'B'"));
    }

    #[test]
    fn test_long_cycle_is_bounded() {
        let mut graph = MaterialGraph::new();
        let first = add(&mut graph, "n0", DataLine::scalar(0.0).unwrap(), DataLine::scalar(0.0).unwrap());
        let mut previous = first;
        for i in 1..200 {
            previous = add(
                &mut graph,
                &format!("n{i}"),
                DataLine::node(previous),
                DataLine::node(previous),
            );
        }
        graph.set_input(first, 1, DataLine::node(previous)).unwrap();

        let err = Scheduler::new(&graph).schedule([&DataLine::node(previous)]).unwrap_err();
        assert!(matches!(err, MaterialError::InfiniteLoop { .. }));
    }

    #[test]
    fn test_self_loop() {
        let mut graph = MaterialGraph::new();
        let a = add(&mut graph, "a", DataLine::scalar(0.0).unwrap(), DataLine::scalar(0.0).unwrap());
        graph.set_input(a, 1, DataLine::node(a)).unwrap();

        let err = Scheduler::new(&graph).schedule([&DataLine::node(a)]).unwrap_err();
        assert!(matches!(err, MaterialError::InfiniteLoop { ref consumer, ref producer } if consumer == "a" && producer == "a"));
    }

    #[test]
    fn test_dangling_reference() {
        let mut graph = MaterialGraph::new();
        let b = graph.add_node("B", Parameter::new(1), vec![]).unwrap();
        let a = add(&mut graph, "A", DataLine::node(b), DataLine::scalar(1.0).unwrap());
        graph.remove_node(b);

        let err = Scheduler::new(&graph).schedule([&DataLine::node(a)]).unwrap_err();
        assert!(matches!(
            err,
            MaterialError::DanglingReference { ref consumer, ref missing } if consumer == "A" && missing == "B"
        ));
    }

    #[test]
    fn test_singletons_are_skipped() {
        let mut graph = MaterialGraph::new();
        let time = graph.singleton(BuiltInValue::ElapsedTime);
        let a = add(&mut graph, "a", DataLine::node(time), DataLine::node(time));

        let schedule = Scheduler::new(&graph)
            .schedule([&DataLine::node(a), &DataLine::node(time)])
            .unwrap();
        assert_eq!(schedule.order(), &[a]);
        assert_eq!(schedule.singletons(), &[time]);
        assert!(!schedule.contains(time));
    }

    #[test]
    fn test_constant_roots_schedule_nothing() {
        let graph = MaterialGraph::new();
        let schedule = Scheduler::new(&graph)
            .schedule([&DataLine::vec4(0.0, 0.0, 0.0, 1.0).unwrap()])
            .unwrap();
        assert!(schedule.is_empty());
    }
}
