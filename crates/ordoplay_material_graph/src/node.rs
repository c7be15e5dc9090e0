// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the material graph.
//!
//! Every node kind implements [`ShaderNode`], the leaf contract the compiler
//! relies on: declare output sizes, validate its own inputs, and emit the
//! statements that compute its outputs. The set of kinds is closed
//! ([`NodeKind`]); [`NodeCatalog`] maps persisted type names back to kinds.

use crate::config::GeneratorConfig;
use crate::context::NodeScope;
use crate::data_line::DataLine;
use crate::error::{MaterialError, Result};
use crate::nodes::{
    Arithmetic, BinaryFunction, BuiltInValue, Clamp, Combine, Cross, DiffuseLighting, Dot,
    FragmentInput, Fresnel, Length, Lerp, Normalize, Parameter, SpecularLighting, Split, Step,
    Swizzle, TextureSample, TransformPoint, UnaryFunction, VertexInput,
};
use crate::persist::{DataReader, DataWriter};
use crate::uniform::UniformInfo;
use crate::usage::MaterialUsageFlags;
use indexmap::IndexMap;
use std::fmt;

/// Stable handle of a node inside a [`MaterialGraph`](crate::graph::MaterialGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena index of this handle
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Behaviour shared by every node kind
pub trait ShaderNode {
    /// Persisted type name
    fn type_name(&self) -> &'static str;

    /// Fixed number of inputs
    fn input_count(&self) -> usize;

    /// Number of outputs
    fn output_count(&self) -> usize {
        1
    }

    /// Size of output `index`, given the sizes of this node's inputs
    fn output_size(&self, index: usize, input_sizes: &[usize]) -> usize;

    /// Expression naming output `index` in generated code
    fn output_name(&self, node_name: &str, index: usize, _config: &GeneratorConfig) -> String {
        if self.output_count() == 1 {
            node_name.to_string()
        } else {
            format!("{node_name}_{index}")
        }
    }

    /// Check this node's own input contract
    fn validate_inputs(&self, _scope: &NodeScope<'_>) -> Result<(), String> {
        Ok(())
    }

    /// Uniforms introduced by this node alone
    fn declared_uniforms(&self, _scope: &NodeScope<'_>) -> Vec<UniformInfo> {
        Vec::new()
    }

    /// Verbatim helper functions this node calls
    fn declared_helper_functions(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Append the statements computing this node's outputs
    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String>;

    /// Built-in context values this node reads
    fn usage_flags(&self) -> MaterialUsageFlags {
        MaterialUsageFlags::empty()
    }

    /// Whether this kind has exactly one conceptual instance
    fn is_singleton(&self) -> bool {
        false
    }

    /// Write kind-specific fields after the node's inputs
    fn write_fields(&self, _writer: &mut dyn DataWriter) -> Result<()> {
        Ok(())
    }
}

/// The closed set of node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Singleton built-in value
    BuiltIn(BuiltInValue),
    /// Custom uniform parameter
    Parameter(Parameter),
    /// Vertex attribute read
    VertexInput(VertexInput),
    /// Interpolated varying read
    FragmentInput(FragmentInput),
    /// 2D texture lookup
    TextureSample(TextureSample),
    /// Add, subtract, multiply, divide
    Arithmetic(Arithmetic),
    /// One-argument component-wise function
    Unary(UnaryFunction),
    /// Two-argument component-wise function
    Binary(BinaryFunction),
    /// Linear interpolation
    Lerp(Lerp),
    /// Step function
    Step(Step),
    /// Clamp to a range
    Clamp(Clamp),
    /// Dot product
    Dot(Dot),
    /// Cross product
    Cross(Cross),
    /// Normalize a vector
    Normalize(Normalize),
    /// Vector length
    Length(Length),
    /// Component selection
    Swizzle(Swizzle),
    /// Concatenate vectors
    Combine(Combine),
    /// Split a vector into scalars
    Split(Split),
    /// Matrix transform of a point
    TransformPoint(TransformPoint),
    /// Lambert diffuse term
    DiffuseLighting(DiffuseLighting),
    /// Blinn-Phong specular term
    SpecularLighting(SpecularLighting),
    /// Fresnel rim term
    Fresnel(Fresnel),
}

impl NodeKind {
    /// The behaviour of this kind
    pub fn as_node(&self) -> &dyn ShaderNode {
        match self {
            Self::BuiltIn(node) => node,
            Self::Parameter(node) => node,
            Self::VertexInput(node) => node,
            Self::FragmentInput(node) => node,
            Self::TextureSample(node) => node,
            Self::Arithmetic(node) => node,
            Self::Unary(node) => node,
            Self::Binary(node) => node,
            Self::Lerp(node) => node,
            Self::Step(node) => node,
            Self::Clamp(node) => node,
            Self::Dot(node) => node,
            Self::Cross(node) => node,
            Self::Normalize(node) => node,
            Self::Length(node) => node,
            Self::Swizzle(node) => node,
            Self::Combine(node) => node,
            Self::Split(node) => node,
            Self::TransformPoint(node) => node,
            Self::DiffuseLighting(node) => node,
            Self::SpecularLighting(node) => node,
            Self::Fresnel(node) => node,
        }
    }

    /// Persisted type name
    pub fn type_name(&self) -> &'static str {
        self.as_node().type_name()
    }

    /// Whether this kind is a singleton
    pub fn is_singleton(&self) -> bool {
        self.as_node().is_singleton()
    }
}

macro_rules! impl_from_kind {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for NodeKind {
                fn from(node: $ty) -> Self {
                    Self::$variant(node)
                }
            }
        )*
    };
}

impl_from_kind! {
    BuiltIn => BuiltInValue,
    Parameter => Parameter,
    VertexInput => VertexInput,
    FragmentInput => FragmentInput,
    TextureSample => TextureSample,
    Arithmetic => Arithmetic,
    Unary => UnaryFunction,
    Binary => BinaryFunction,
    Lerp => Lerp,
    Step => Step,
    Clamp => Clamp,
    Dot => Dot,
    Cross => Cross,
    Normalize => Normalize,
    Length => Length,
    Swizzle => Swizzle,
    Combine => Combine,
    Split => Split,
    TransformPoint => TransformPoint,
    DiffuseLighting => DiffuseLighting,
    SpecularLighting => SpecularLighting,
    Fresnel => Fresnel,
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    inputs: Vec<DataLine>,
    last_error: Option<String>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, inputs: Vec<DataLine>) -> Self {
        Self {
            name,
            kind,
            inputs,
            last_error: None,
        }
    }

    /// Unique node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Persisted type name
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Input lines, in declaration order
    pub fn inputs(&self) -> &[DataLine] {
        &self.inputs
    }

    /// Get an input by index
    pub fn input(&self, index: usize) -> Option<&DataLine> {
        self.inputs.get(index)
    }

    pub(crate) fn set_input(&mut self, index: usize, line: DataLine) {
        self.inputs[index] = line;
    }

    /// Number of declared outputs
    pub fn output_count(&self) -> usize {
        self.kind.as_node().output_count()
    }

    /// Whether this node is a singleton built-in
    pub fn is_singleton(&self) -> bool {
        self.kind.is_singleton()
    }

    /// Message recorded by the last failed compile
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn set_last_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }
}

/// Reads kind-specific fields and builds a node kind
pub type NodeConstructor = fn(&mut dyn DataReader) -> Result<NodeKind>;

/// Registry of constructible node kinds, keyed by type name
pub struct NodeCatalog {
    constructors: IndexMap<&'static str, NodeConstructor>,
}

impl NodeCatalog {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// Catalogue of every standard node kind
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register("Parameter", |r| Parameter::read_fields(r).map(NodeKind::from));
        catalog.register("VertexInput", |r| VertexInput::read_fields(r).map(NodeKind::from));
        catalog.register("FragmentInput", |r| FragmentInput::read_fields(r).map(NodeKind::from));
        catalog.register("TextureSample", |r| TextureSample::read_fields(r).map(NodeKind::from));
        catalog.register("Arithmetic", |r| Arithmetic::read_fields(r).map(NodeKind::from));
        catalog.register("UnaryFunction", |r| UnaryFunction::read_fields(r).map(NodeKind::from));
        catalog.register("BinaryFunction", |r| BinaryFunction::read_fields(r).map(NodeKind::from));
        catalog.register("Lerp", |_| Ok(Lerp.into()));
        catalog.register("Step", |_| Ok(Step.into()));
        catalog.register("Clamp", |_| Ok(Clamp.into()));
        catalog.register("Dot", |_| Ok(Dot.into()));
        catalog.register("Cross", |_| Ok(Cross.into()));
        catalog.register("Normalize", |_| Ok(Normalize.into()));
        catalog.register("Length", |_| Ok(Length.into()));
        catalog.register("Swizzle", |r| Swizzle::read_fields(r).map(NodeKind::from));
        catalog.register("Combine", |r| Combine::read_fields(r).map(NodeKind::from));
        catalog.register("Split", |r| Split::read_fields(r).map(NodeKind::from));
        catalog.register("TransformPoint", |r| TransformPoint::read_fields(r).map(NodeKind::from));
        catalog.register("DiffuseLighting", |_| Ok(DiffuseLighting.into()));
        catalog.register("SpecularLighting", |_| Ok(SpecularLighting.into()));
        catalog.register("Fresnel", |_| Ok(Fresnel.into()));
        catalog
    }

    /// Register a constructor for a type name
    pub fn register(&mut self, type_name: &'static str, constructor: NodeConstructor) {
        self.constructors.insert(type_name, constructor);
    }

    /// Whether a type name is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// All registered type names
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Build a node kind by reading its fields
    pub fn construct(&self, type_name: &str, reader: &mut dyn DataReader) -> Result<NodeKind> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| MaterialError::UnknownNodeType(type_name.to_string()))?;
        constructor(reader)
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::ArithmeticOp;
    use crate::persist::{TreeReader, TreeWriter};

    #[test]
    fn test_standard_catalog_covers_persistable_kinds() {
        let catalog = NodeCatalog::standard();
        for kind in [
            NodeKind::from(Parameter::new(3)),
            NodeKind::from(Arithmetic::new(ArithmeticOp::Add)),
            NodeKind::from(Swizzle::new("xy").unwrap()),
            NodeKind::from(Fresnel),
        ] {
            assert!(catalog.contains(kind.type_name()), "{}", kind.type_name());
        }
        assert!(!catalog.contains(BuiltInValue::ElapsedTime.type_name()));
    }

    #[test]
    fn test_construct_reads_fields() {
        let mut writer = TreeWriter::new();
        Parameter::new(2).write_fields(&mut writer).unwrap();
        let mut reader = TreeReader::new(writer.finish().unwrap()).unwrap();

        let kind = NodeCatalog::standard()
            .construct("Parameter", &mut reader)
            .unwrap();
        assert_eq!(kind, NodeKind::Parameter(Parameter::new(2)));
    }

    #[test]
    fn test_unknown_type_name() {
        let mut reader = TreeReader::new(TreeWriter::new().finish().unwrap()).unwrap();
        let err = NodeCatalog::standard()
            .construct("Teapot", &mut reader)
            .unwrap_err();
        assert!(matches!(err, MaterialError::UnknownNodeType(name) if name == "Teapot"));
    }
}
