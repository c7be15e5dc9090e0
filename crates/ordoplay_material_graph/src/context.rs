// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compile context handed to node hooks.
//!
//! Replaces any notion of a "current material" or "current stage": one
//! [`CompileContext`] is built per stage compile, borrows the graph and
//! material, and caches the output sizes of every scheduled node.

use crate::config::GeneratorConfig;
use crate::data_line::{glsl_type, DataLine};
use crate::error::{MaterialError, Result};
use crate::graph::MaterialGraph;
use crate::material::SerializedMaterial;
use crate::node::{Node, NodeId};
use crate::scheduler::Schedule;
use std::collections::HashMap;
use std::fmt::{Display, Write};

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Optional geometry stage
    Geometry,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Lowercase stage name
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        }
    }
}

/// State shared by every node hook during one stage compile
pub struct CompileContext<'a> {
    graph: &'a MaterialGraph,
    material: &'a SerializedMaterial,
    config: &'a GeneratorConfig,
    stage: ShaderStage,
    sizes: HashMap<NodeId, Vec<usize>>,
    varyings: Vec<(String, usize)>,
}

impl<'a> CompileContext<'a> {
    /// Create a context for `stage` and resolve the sizes of every scheduled node
    pub fn new(
        graph: &'a MaterialGraph,
        material: &'a SerializedMaterial,
        config: &'a GeneratorConfig,
        stage: ShaderStage,
        schedule: &Schedule,
    ) -> Result<Self> {
        let mut ctx = Self {
            graph,
            material,
            config,
            stage,
            sizes: HashMap::new(),
            varyings: Vec::new(),
        };
        if stage == ShaderStage::Fragment {
            ctx.varyings = fragment_varyings(graph, material)?;
        }

        // Singletons first, then leaves-first order: every producer is sized
        // before any of its consumers.
        for id in schedule.singletons().iter().chain(schedule.order()) {
            let node = ctx.live_node(*id, "scheduler")?;
            let input_sizes = node
                .inputs()
                .iter()
                .map(|line| ctx.line_size(line))
                .collect::<Result<Vec<_>>>()?;
            let behaviour = node.kind().as_node();
            let sizes = (0..behaviour.output_count())
                .map(|index| behaviour.output_size(index, &input_sizes))
                .collect();
            ctx.sizes.insert(*id, sizes);
        }
        Ok(ctx)
    }

    /// The graph being compiled
    pub fn graph(&self) -> &'a MaterialGraph {
        self.graph
    }

    /// The material being compiled
    pub fn material(&self) -> &'a SerializedMaterial {
        self.material
    }

    /// Generator settings
    pub fn config(&self) -> &'a GeneratorConfig {
        self.config
    }

    /// The active stage
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Interpolated inputs available to the fragment stage
    pub fn varyings(&self) -> &[(String, usize)] {
        &self.varyings
    }

    fn live_node(&self, id: NodeId, consumer: &str) -> Result<&'a Node> {
        self.graph.node(id).ok_or_else(|| MaterialError::DanglingReference {
            consumer: consumer.to_string(),
            missing: self.graph.display_name(id),
        })
    }

    /// Vector size carried by a line
    pub fn line_size(&self, line: &DataLine) -> Result<usize> {
        match line {
            DataLine::Constant(value) => Ok(value.len()),
            DataLine::Output { node, index } => match self.sizes.get(node) {
                Some(sizes) => sizes.get(*index).copied().ok_or_else(|| MaterialError::InvalidOutput {
                    consumer: "expression".to_string(),
                    producer: self.graph.display_name(*node),
                    index: *index,
                    count: sizes.len(),
                }),
                None => self.graph.output_size(*node, *index),
            },
        }
    }

    /// Expression a line renders to in generated code
    pub fn expression(&self, line: &DataLine) -> Result<String> {
        match line {
            DataLine::Constant(value) => Ok(value.render()),
            DataLine::Output { node, index } => {
                let producer = self.live_node(*node, "expression")?;
                Ok(producer
                    .kind()
                    .as_node()
                    .output_name(producer.name(), *index, self.config))
            }
        }
    }

    /// Resolve everything a node hook needs to see
    pub fn scope(&self, id: NodeId) -> Result<NodeScope<'_>> {
        let node = self.live_node(id, "scope")?;
        let mut input_sizes = Vec::with_capacity(node.inputs().len());
        let mut input_exprs = Vec::with_capacity(node.inputs().len());
        for line in node.inputs() {
            input_sizes.push(self.line_size(line)?);
            input_exprs.push(self.expression(line)?);
        }
        let behaviour = node.kind().as_node();
        let output_sizes = (0..behaviour.output_count())
            .map(|index| behaviour.output_size(index, &input_sizes))
            .collect();

        Ok(NodeScope {
            ctx: self,
            id,
            node,
            input_sizes,
            input_exprs,
            output_sizes,
        })
    }

    /// Run a node's validation hook
    pub fn validate_node(&self, id: NodeId) -> Result<()> {
        let scope = self.scope(id)?;
        scope
            .node()
            .kind()
            .as_node()
            .validate_inputs(&scope)
            .map_err(|message| scope.error(message))
    }

    /// Run a node's emission hook, appending to `out`
    pub fn emit_node(&self, id: NodeId, out: &mut String) -> Result<()> {
        let scope = self.scope(id)?;
        scope
            .node()
            .kind()
            .as_node()
            .emit_statement(&scope, out)
            .map_err(|message| scope.error(message))
    }
}

/// Names and sizes of the values the fragment stage receives
pub fn fragment_varyings(
    graph: &MaterialGraph,
    material: &SerializedMaterial,
) -> Result<Vec<(String, usize)>> {
    if material.geo_shader.is_valid() {
        return Ok(material.geo_shader.output_attributes.clone());
    }
    material
        .material_outputs
        .vertex_outputs
        .iter()
        .map(|(name, line)| Ok((name.clone(), line.size(graph)?)))
        .collect()
}

/// One node's view of the compile: its resolved inputs and outputs
pub struct NodeScope<'a> {
    ctx: &'a CompileContext<'a>,
    id: NodeId,
    node: &'a Node,
    input_sizes: Vec<usize>,
    input_exprs: Vec<String>,
    output_sizes: Vec<usize>,
}

impl<'a> NodeScope<'a> {
    /// Handle of the node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node itself
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// Node name
    pub fn name(&self) -> &'a str {
        self.node.name()
    }

    /// Active stage
    pub fn stage(&self) -> ShaderStage {
        self.ctx.stage()
    }

    /// Material being compiled
    pub fn material(&self) -> &'a SerializedMaterial {
        self.ctx.material()
    }

    /// Generator settings
    pub fn config(&self) -> &'a GeneratorConfig {
        self.ctx.config()
    }

    /// Interpolated inputs available to the fragment stage
    pub fn varyings(&self) -> &[(String, usize)] {
        self.ctx.varyings()
    }

    /// Size of input `index`
    pub fn input_size(&self, index: usize) -> usize {
        self.input_sizes[index]
    }

    /// Expression of input `index`
    pub fn input_expr(&self, index: usize) -> &str {
        &self.input_exprs[index]
    }

    /// Expression of input `index`, widened to `size` components when it is a scalar
    pub fn input_broadcast(&self, index: usize, size: usize) -> String {
        if self.input_size(index) == 1 && size > 1 {
            format!("{}({})", glsl_type(size), self.input_expr(index))
        } else {
            self.input_expr(index).to_string()
        }
    }

    /// Size of output `index`
    pub fn output_size(&self, index: usize) -> usize {
        self.output_sizes[index]
    }

    /// Variable name of output `index`
    pub fn output_name(&self, index: usize) -> String {
        self.node
            .kind()
            .as_node()
            .output_name(self.node.name(), index, self.config())
    }

    /// Full name of a built-in uniform
    pub fn builtin(&self, base_name: &str) -> String {
        self.config().builtin_name(base_name)
    }

    /// Append `<type> <output> = <expr>;` for output `index`
    pub fn declare(&self, out: &mut String, index: usize, expr: impl Display) {
        let _ = writeln!(
            out,
            "    {} {} = {};",
            glsl_type(self.output_size(index)),
            self.output_name(index),
            expr
        );
    }

    fn error(&self, message: String) -> MaterialError {
        MaterialError::Validation {
            node: self.id,
            name: self.node.name().to_string(),
            message,
        }
    }
}
