// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data lines: the edges of a material graph.
//!
//! A [`DataLine`] is either a literal vector of one to four floats or a
//! reference to one output of another node. References hold arena handles;
//! names only appear at the persistence boundary.

use crate::error::Result;
use crate::graph::{GraphError, MaterialGraph};
use crate::node::NodeId;

/// Largest vector size a data line can carry
pub const MAX_COMPONENTS: usize = 4;

/// A literal vector of one to four floats
#[derive(Debug, Clone, Copy)]
pub struct ConstantValue {
    values: [f32; MAX_COMPONENTS],
    len: u8,
}

impl ConstantValue {
    /// `vec4(0, 0, 0, 1)`
    pub const ORIGIN: Self = Self {
        values: [0.0, 0.0, 0.0, 1.0],
        len: 4,
    };

    /// Create a constant from 1..=4 finite components
    pub fn new(values: &[f32]) -> Result<Self, GraphError> {
        if values.is_empty() || values.len() > MAX_COMPONENTS {
            return Err(GraphError::InvalidConstant(values.len()));
        }
        if let Some(&value) = values.iter().find(|value| !value.is_finite()) {
            return Err(GraphError::NonFiniteConstant(value));
        }
        let mut stored = [0.0; MAX_COMPONENTS];
        stored[..values.len()].copy_from_slice(values);
        Ok(Self {
            values: stored,
            len: values.len() as u8,
        })
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; a constant has at least one component
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The components
    pub fn values(&self) -> &[f32] {
        &self.values[..self.len()]
    }

    /// Render as a GLSL literal: a bare number for size 1, `vecN(...)` otherwise
    pub fn render(&self) -> String {
        if self.len() == 1 {
            return format_float(self.values[0]);
        }
        let parts: Vec<String> = self.values().iter().copied().map(format_float).collect();
        format!("{}({})", glsl_type(self.len()), parts.join(", "))
    }
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        self.values() == other.values()
    }
}

/// An edge value feeding a node input or a root output
#[derive(Debug, Clone, PartialEq)]
pub enum DataLine {
    /// Literal vector
    Constant(ConstantValue),
    /// Output `index` of another node
    Output {
        /// Producing node
        node: NodeId,
        /// Output index on the producer
        index: usize,
    },
}

impl DataLine {
    /// Constant line from 1..=4 components
    pub fn constant(values: &[f32]) -> Result<Self, GraphError> {
        ConstantValue::new(values).map(Self::Constant)
    }

    /// Size-1 constant
    pub fn scalar(value: f32) -> Result<Self, GraphError> {
        Self::constant(&[value])
    }

    /// Size-2 constant
    pub fn vec2(x: f32, y: f32) -> Result<Self, GraphError> {
        Self::constant(&[x, y])
    }

    /// Size-3 constant
    pub fn vec3(x: f32, y: f32, z: f32) -> Result<Self, GraphError> {
        Self::constant(&[x, y, z])
    }

    /// Size-4 constant
    pub fn vec4(x: f32, y: f32, z: f32, w: f32) -> Result<Self, GraphError> {
        Self::constant(&[x, y, z, w])
    }

    /// Reference to output `index` of `node`
    pub fn output(node: NodeId, index: usize) -> Self {
        Self::Output { node, index }
    }

    /// Reference to the first output of `node`
    pub fn node(node: NodeId) -> Self {
        Self::output(node, 0)
    }

    /// Whether this line is a literal
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// The referenced node and output index, if this is a reference
    pub fn as_output(&self) -> Option<(NodeId, usize)> {
        match self {
            Self::Constant(_) => None,
            Self::Output { node, index } => Some((*node, *index)),
        }
    }

    /// Vector size carried by this line
    pub fn size(&self, graph: &MaterialGraph) -> Result<usize> {
        match self {
            Self::Constant(value) => Ok(value.len()),
            Self::Output { node, index } => graph.output_size(*node, *index),
        }
    }
}

/// GLSL type name for a vector size
pub fn glsl_type(size: usize) -> &'static str {
    match size {
        1 => "float",
        2 => "vec2",
        3 => "vec3",
        _ => "vec4",
    }
}

/// Largest magnitude printed without an exponent; keeps integral values
/// inside GLSL's `int` literal range
const PLAIN_MAX: f32 = 1.0e9;

/// Smallest non-zero magnitude printed without an exponent
const PLAIN_MIN: f32 = 1.0e-4;

/// Float literal as it appears in generated source
///
/// Constants are finite by construction.
pub fn format_float(value: f32) -> String {
    let magnitude = value.abs();
    if magnitude >= PLAIN_MAX || (magnitude != 0.0 && magnitude < PLAIN_MIN) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}
