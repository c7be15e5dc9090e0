// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material graph compiler for `OrdoPlay`.
//!
//! Turns a graph of shader nodes into GLSL source for the vertex, fragment
//! and optional geometry stages, together with the uniforms each stage
//! expects the renderer to bind.
//!
//! ## Architecture
//!
//! - [`MaterialGraph`] owns the nodes in an arena; edges are [`DataLine`]s
//!   holding either a constant or a `(NodeId, output)` reference
//! - [`Scheduler`] orders the nodes a stage needs, leaves first, and rejects
//!   cycles and dangling references
//! - [`MaterialCompiler`] validates, collects uniforms and emits each stage
//!   through a per-stage [`CompileContext`]
//! - [`persist`] reads and writes graphs through an opaque capability, with
//!   RON and bincode encodings

pub mod config;
pub mod context;
pub mod data_line;
pub mod error;
pub mod generator;
pub mod graph;
pub mod material;
pub mod node;
pub mod nodes;
pub mod persist;
pub mod scheduler;
pub mod uniform;
pub mod usage;

pub use config::GeneratorConfig;
pub use context::{CompileContext, NodeScope, ShaderStage};
pub use data_line::{ConstantValue, DataLine};
pub use error::{ErrorKind, MaterialError, Result};
pub use generator::{CompiledMaterial, GeneratedShader, MaterialCompiler};
pub use graph::{GraphError, MaterialGraph};
pub use material::{
    GeoShaderData, InputPrimitive, MaterialOutputs, OutputPrimitive, SerializedMaterial,
    VertexAttribute,
};
pub use node::{Node, NodeCatalog, NodeId, NodeKind, ShaderNode};
pub use persist::{DataReader, DataWriter};
pub use scheduler::{Schedule, Scheduler};
pub use uniform::{UniformInfo, UniformKind};
pub use usage::MaterialUsageFlags;
