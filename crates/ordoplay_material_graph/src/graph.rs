// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material graph: node arena plus name table.
//!
//! Nodes live in an arena addressed by [`NodeId`]. Removing a node leaves a
//! tombstone that remembers its name, so stale handles surface as dangling
//! references instead of silently aliasing a newer node. The name table is
//! only consulted at the persistence boundary.

use crate::data_line::DataLine;
use crate::error::{ErrorKind, MaterialError, Result};
use crate::node::{Node, NodeId, NodeKind};
use crate::nodes::BuiltInValue;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Slot {
    Live(Node),
    Removed(String),
}

/// A material node graph
#[derive(Debug, Clone, Default)]
pub struct MaterialGraph {
    slots: Vec<Slot>,
    names: IndexMap<String, NodeId>,
    singletons: IndexMap<BuiltInValue, NodeId>,
}

impl MaterialGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with a fixed list of inputs
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<NodeKind>,
        inputs: Vec<DataLine>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        let kind = kind.into();
        validate_name(&name)?;
        if BuiltInValue::from_type_name(&name).is_some() {
            return Err(GraphError::ReservedName(name));
        }
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        if kind.is_singleton() {
            return Err(GraphError::SingletonKind(kind.type_name()));
        }

        let expected = kind.as_node().input_count();
        if inputs.len() != expected {
            return Err(GraphError::ArityMismatch {
                node: name,
                type_name: kind.type_name(),
                expected,
                actual: inputs.len(),
            });
        }
        for line in &inputs {
            self.check_line(line)?;
        }

        Ok(self.insert(Node::new(name, kind, inputs)))
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.names.insert(node.name().to_string(), id);
        self.slots.push(Slot::Live(node));
        id
    }

    /// The singleton node for a built-in value, created on first use
    pub fn singleton(&mut self, value: BuiltInValue) -> NodeId {
        if let Some(id) = self.singletons.get(&value) {
            return *id;
        }
        let id = self.insert(Node::new(value.type_name().to_string(), value.into(), Vec::new()));
        self.singletons.insert(value, id);
        id
    }

    /// Rewire one input of an existing node
    pub fn set_input(&mut self, node: NodeId, index: usize, line: DataLine) -> Result<(), GraphError> {
        self.check_line(&line)?;
        let target = self.node_mut(node).ok_or(GraphError::UnknownNode(node))?;
        if index >= target.inputs().len() {
            return Err(GraphError::InputIndex {
                node: target.name().to_string(),
                index,
            });
        }
        target.set_input(index, line);
        Ok(())
    }

    fn check_line(&self, line: &DataLine) -> Result<(), GraphError> {
        if let Some((producer, index)) = line.as_output() {
            let node = self.node(producer).ok_or(GraphError::UnknownNode(producer))?;
            if index >= node.output_count() {
                return Err(GraphError::OutputIndex {
                    node: node.name().to_string(),
                    index,
                });
            }
        }
        Ok(())
    }

    /// Remove a node; references to it become dangling
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(node_id.index())?;
        let Slot::Live(node) = slot else {
            return None;
        };
        let name = node.name().to_string();
        let Slot::Live(node) = std::mem::replace(slot, Slot::Removed(name.clone())) else {
            return None;
        };
        self.names.shift_remove(&name);
        self.singletons.retain(|_, id| *id != node_id);
        Some(node)
    }

    /// Remove every node and name; handles from before are invalidated
    pub fn clear(&mut self) {
        self.slots.clear();
        self.names.clear();
        self.singletons.clear();
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        match self.slots.get(node_id.index()) {
            Some(Slot::Live(node)) => Some(node),
            _ => None,
        }
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        match self.slots.get_mut(node_id.index()) {
            Some(Slot::Live(node)) => Some(node),
            _ => None,
        }
    }

    /// Look up a node by name
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Name of a node for diagnostics, including removed nodes
    pub fn display_name(&self, node_id: NodeId) -> String {
        match self.slots.get(node_id.index()) {
            Some(Slot::Live(node)) => node.name().to_string(),
            Some(Slot::Removed(name)) => name.clone(),
            None => node_id.to_string(),
        }
    }

    /// Get all live nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.names.values().filter_map(|id| self.node(*id).map(|node| (*id, node)))
    }

    /// Built-in values that have a singleton node, in creation order
    pub fn builtins(&self) -> impl Iterator<Item = BuiltInValue> + '_ {
        self.singletons.keys().copied()
    }

    /// Get the number of live nodes, singletons included
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Whether the graph has no live nodes
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Record a compile failure on a node
    pub fn record_error(&mut self, node_id: NodeId, message: impl Into<String>) {
        if let Some(node) = self.node_mut(node_id) {
            node.set_last_error(Some(message.into()));
        }
    }

    /// Forget every recorded compile failure
    pub fn clear_errors(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Live(node) = slot {
                node.set_last_error(None);
            }
        }
    }

    /// Size of output `index` of a node.
    ///
    /// Sizes are memoised per call; a cyclic dependency yields an
    /// infinite-loop error.
    pub fn output_size(&self, node_id: NodeId, index: usize) -> Result<usize> {
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        let sizes = self.output_sizes(node_id, "size query", &mut memo, &mut visiting)?;
        sizes.get(index).copied().ok_or_else(|| MaterialError::InvalidOutput {
            consumer: "size query".to_string(),
            producer: self.display_name(node_id),
            index,
            count: sizes.len(),
        })
    }

    fn output_sizes(
        &self,
        node_id: NodeId,
        consumer: &str,
        memo: &mut HashMap<NodeId, Vec<usize>>,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<Vec<usize>> {
        if let Some(sizes) = memo.get(&node_id) {
            return Ok(sizes.clone());
        }
        let node = self.node(node_id).ok_or_else(|| MaterialError::DanglingReference {
            consumer: consumer.to_string(),
            missing: self.display_name(node_id),
        })?;
        if !visiting.insert(node_id) {
            return Err(MaterialError::InfiniteLoop {
                consumer: consumer.to_string(),
                producer: node.name().to_string(),
            });
        }

        let mut input_sizes = Vec::with_capacity(node.inputs().len());
        for line in node.inputs() {
            let size = match line {
                DataLine::Constant(value) => value.len(),
                DataLine::Output { node: producer, index } => {
                    let sizes = self.output_sizes(*producer, node.name(), memo, visiting)?;
                    sizes.get(*index).copied().ok_or_else(|| MaterialError::InvalidOutput {
                        consumer: node.name().to_string(),
                        producer: self.display_name(*producer),
                        index: *index,
                        count: sizes.len(),
                    })?
                }
            };
            input_sizes.push(size);
        }

        let behaviour = node.kind().as_node();
        let sizes: Vec<usize> = (0..behaviour.output_count())
            .map(|output| behaviour.output_size(output, &input_sizes))
            .collect();
        visiting.remove(&node_id);
        memo.insert(node_id, sizes.clone());
        Ok(sizes)
    }
}

/// Whether `name` can be used as a node or output identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("gl_")
}

fn validate_name(name: &str) -> Result<(), GraphError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(GraphError::InvalidName(name.to_string()))
    }
}

/// Error when building or rewiring a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Name is not a usable identifier
    #[error("invalid node name '{0}'")]
    InvalidName(String),

    /// Name is reserved for a singleton built-in
    #[error("node name '{0}' is reserved for a built-in")]
    ReservedName(String),

    /// Name already registered
    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    /// Singleton kinds are created through `MaterialGraph::singleton`
    #[error("'{0}' is a singleton and cannot be added as a regular node")]
    SingletonKind(&'static str),

    /// Wrong number of inputs for the kind
    #[error("node '{node}' of type '{type_name}' takes {expected} input(s), {actual} given")]
    ArityMismatch {
        /// Node name
        node: String,
        /// Node type name
        type_name: &'static str,
        /// Declared arity
        expected: usize,
        /// Supplied input count
        actual: usize,
    },

    /// Handle does not refer to a live node
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Output index beyond the producer's output count
    #[error("node '{node}' has no output {index}")]
    OutputIndex {
        /// Producer name
        node: String,
        /// Requested output
        index: usize,
    },

    /// Input index beyond the node's arity
    #[error("node '{node}' has no input {index}")]
    InputIndex {
        /// Node name
        node: String,
        /// Requested input
        index: usize,
    },

    /// Constant with zero or more than four components
    #[error("constants must have 1 to 4 components, found {0}")]
    InvalidConstant(usize),

    /// Constant component that is NaN or infinite
    #[error("constant component {0} is not finite")]
    NonFiniteConstant(f32),

    /// Swizzle pattern is empty, too long or uses unknown components
    #[error("invalid swizzle pattern '{0}'")]
    InvalidSwizzle(String),

    /// Variadic node given an unsupported input count
    #[error("'{type_name}' supports {min} to {max} inputs, {actual} requested")]
    InputCount {
        /// Node type name
        type_name: &'static str,
        /// Minimum inputs
        min: usize,
        /// Maximum inputs
        max: usize,
        /// Requested inputs
        actual: usize,
    },
}

impl GraphError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArityMismatch { .. }
            | Self::InvalidConstant(_)
            | Self::NonFiniteConstant(_)
            | Self::InvalidSwizzle(_)
            | Self::InputCount { .. } => ErrorKind::Validation,
            _ => ErrorKind::Structural,
        }
    }
}
