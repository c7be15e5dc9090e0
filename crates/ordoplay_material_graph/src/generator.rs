// SPDX-License-Identifier: MIT OR Apache-2.0
//! GLSL generation for material graphs.
//!
//! Each stage is compiled on its own: the roots of that stage are scheduled,
//! every reachable node is validated, and only then is any source emitted.
//! Usage flags, uniforms and helper functions are collected per stage, so a
//! node used only by the fragment outputs never shows up in the vertex
//! shader.

use crate::config::GeneratorConfig;
use crate::context::{CompileContext, ShaderStage};
use crate::data_line::{glsl_type, DataLine, MAX_COMPONENTS};
use crate::error::{MaterialError, Result};
use crate::graph::{is_identifier, MaterialGraph};
use crate::material::{SerializedMaterial, VertexAttribute};
use crate::node::NodeId;
use crate::scheduler::{Schedule, Scheduler};
use crate::uniform::{merge_uniforms, UniformInfo};
use crate::usage::MaterialUsageFlags;
use std::collections::HashSet;
use std::fmt::Write;

/// Source text of one stage and what it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShader {
    /// Stage the source belongs to
    pub stage: ShaderStage,
    /// GLSL source
    pub source: String,
    /// Uniforms declared by the source, built-ins first
    pub uniforms: Vec<UniformInfo>,
    /// Built-in values the source reads
    pub usage_flags: MaterialUsageFlags,
}

/// Every stage of a compiled material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMaterial {
    /// Vertex stage
    pub vertex: GeneratedShader,
    /// Fragment stage
    pub fragment: GeneratedShader,
    /// Geometry stage, when the material carries a valid one
    pub geometry: Option<GeneratedShader>,
    /// Uniforms of all stages, de-duplicated by name
    pub uniforms: Vec<UniformInfo>,
}

/// Compiles materials into GLSL
#[derive(Debug, Clone, Default)]
pub struct MaterialCompiler {
    config: GeneratorConfig,
}

impl MaterialCompiler {
    /// Create a compiler with the given settings
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Generator settings
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Compile every stage and record the outcome on the graph
    ///
    /// Errors left by an earlier compile are cleared first. When a node
    /// rejects its inputs the message is also stored on that node.
    pub fn compile(
        &self,
        graph: &mut MaterialGraph,
        material: &SerializedMaterial,
    ) -> Result<CompiledMaterial> {
        graph.clear_errors();
        let result = self.generate_material(graph, material);
        match &result {
            Ok(compiled) => tracing::info!(
                "Compiled material: {} uniform(s), geometry stage {}",
                compiled.uniforms.len(),
                if compiled.geometry.is_some() { "enabled" } else { "disabled" }
            ),
            Err(error) => {
                tracing::warn!("Material compile failed: {}", error);
                if let Some(node) = error.node() {
                    graph.record_error(node, error.root_cause().to_string());
                }
            }
        }
        result
    }

    /// Generate the vertex and fragment stages, and the geometry stage when valid
    pub fn generate_material(
        &self,
        graph: &MaterialGraph,
        material: &SerializedMaterial,
    ) -> Result<CompiledMaterial> {
        let vertex = self.generate_stage(graph, material, ShaderStage::Vertex)?;
        let fragment = self.generate_stage(graph, material, ShaderStage::Fragment)?;
        let geometry = if material.geo_shader.is_valid() {
            Some(self.generate_geometry(graph, material)?)
        } else {
            let geo = &material.geo_shader;
            if !geo.body.is_empty() || !geo.output_attributes.is_empty() {
                tracing::warn!("Ignoring geometry shader data without a body or max_vertices");
            }
            None
        };

        let mut uniforms = Vec::new();
        for shader in std::iter::once(&vertex).chain(Some(&fragment)).chain(geometry.as_ref()) {
            merge_uniforms(&mut uniforms, shader.uniforms.iter().cloned());
        }

        Ok(CompiledMaterial {
            vertex,
            fragment,
            geometry,
            uniforms,
        })
    }

    /// Generate the vertex or fragment stage
    pub fn generate_stage(
        &self,
        graph: &MaterialGraph,
        material: &SerializedMaterial,
        stage: ShaderStage,
    ) -> Result<GeneratedShader> {
        if stage == ShaderStage::Geometry {
            return self.generate_geometry(graph, material);
        }

        if stage == ShaderStage::Vertex {
            validate_vertex_layout(&material.vertex_input_layout)?;
        }
        let roots = stage_roots(material, stage)?;
        let schedule = Scheduler::new(graph)
            .schedule_labeled(roots.iter().map(|root| (root.label.as_str(), root.line)))?;
        let ctx = CompileContext::new(graph, material, &self.config, stage, &schedule)?;

        if stage == ShaderStage::Vertex {
            let position = &material.material_outputs.vertex_pos_output;
            let actual = ctx.line_size(position)?;
            if actual != 4 {
                return Err(MaterialError::OutputSize {
                    output: "vertex position".to_string(),
                    expected: 4,
                    actual,
                });
            }
        }

        for id in schedule.singletons().iter().chain(schedule.order()) {
            ctx.validate_node(*id)
                .map_err(|e| e.context(root_reaching(graph, &roots, *id)))?;
        }

        let usage_flags = schedule
            .singletons()
            .iter()
            .chain(schedule.order())
            .filter_map(|id| graph.node(*id))
            .fold(MaterialUsageFlags::empty(), |flags, node| {
                flags | node.kind().as_node().usage_flags()
            });

        let mut uniforms = usage_flags.builtin_uniforms(&self.config);
        let mut helpers: Vec<&'static str> = Vec::new();
        let mut locals = HashSet::new();
        let mut body = String::new();
        for id in schedule.order() {
            let scope = ctx.scope(*id)?;
            let behaviour = scope.node().kind().as_node();
            locals.extend((0..behaviour.output_count()).map(|index| scope.output_name(index)));
            for uniform in behaviour.declared_uniforms(&scope) {
                add_uniform(&mut uniforms, uniform, scope.id(), scope.name())?;
            }
            for helper in behaviour.declared_helper_functions() {
                if !helpers.contains(&helper) {
                    helpers.push(helper);
                }
            }
            ctx.emit_node(*id, &mut body)?;
        }

        let inputs: Vec<&str> = match stage {
            ShaderStage::Vertex => material
                .vertex_input_layout
                .iter()
                .map(|attribute| attribute.name.as_str())
                .collect(),
            _ => ctx.varyings().iter().map(|(name, _)| name.as_str()).collect(),
        };
        for root in &roots {
            let Some(name) = root.name else { continue };
            if let Some(other) = name_conflict(name, &locals, &uniforms, &inputs) {
                return Err(MaterialError::NameConflict {
                    output: root.label.clone(),
                    other,
                });
            }
        }

        let mut source = String::new();
        self.write_preamble(&mut source);
        match stage {
            ShaderStage::Vertex => {
                for (location, attribute) in material.vertex_input_layout.iter().enumerate() {
                    let _ = writeln!(
                        source,
                        "layout (location = {location}) in {} {};",
                        glsl_type(attribute.size),
                        attribute.name
                    );
                }
            }
            _ => {
                for (name, size) in ctx.varyings() {
                    let _ = writeln!(source, "in {} {name};", glsl_type(*size));
                }
            }
        }
        write_uniforms(&mut source, &uniforms);
        for helper in &helpers {
            source.push('\n');
            source.push_str(helper);
        }

        let outputs = &material.material_outputs;
        let mut assignments = String::new();
        if stage == ShaderStage::Vertex {
            source.push('\n');
            for (name, line) in &outputs.vertex_outputs {
                let _ = writeln!(source, "out {} {name};", glsl_type(ctx.line_size(line)?));
            }
            let _ = writeln!(
                assignments,
                "    gl_Position = {};",
                ctx.expression(&outputs.vertex_pos_output)?
            );
            for (name, line) in &outputs.vertex_outputs {
                let _ = writeln!(assignments, "    {name} = {};", ctx.expression(line)?);
            }
        } else {
            source.push('\n');
            for (location, (name, line)) in outputs.fragment_outputs.iter().enumerate() {
                let _ = writeln!(
                    source,
                    "layout (location = {location}) out {} {name};",
                    glsl_type(ctx.line_size(line)?)
                );
            }
            for (name, line) in &outputs.fragment_outputs {
                let _ = writeln!(assignments, "    {name} = {};", ctx.expression(line)?);
            }
        }

        source.push_str("\nvoid main()\n{\n");
        source.push_str(&body);
        source.push_str(&assignments);
        source.push_str("}\n");

        tracing::debug!(
            "Generated {} stage: {} statement node(s), {} uniform(s), {} helper(s)",
            stage.name(),
            schedule.len(),
            uniforms.len(),
            helpers.len()
        );

        Ok(GeneratedShader {
            stage,
            source,
            uniforms,
            usage_flags,
        })
    }

    /// Generate the geometry stage around the material's verbatim body
    pub fn generate_geometry(
        &self,
        graph: &MaterialGraph,
        material: &SerializedMaterial,
    ) -> Result<GeneratedShader> {
        let geo = &material.geo_shader;
        if !geo.is_valid() {
            return Err(MaterialError::InvalidGeometryShader);
        }
        for (i, (name, size)) in geo.output_attributes.iter().enumerate() {
            if !is_identifier(name) {
                return Err(MaterialError::InvalidOutputName(name.clone()));
            }
            if !(1..=MAX_COMPONENTS).contains(size) {
                return Err(MaterialError::InvalidInterface {
                    what: "geometry output",
                    name: name.clone(),
                    reason: format!("must have 1 to 4 components, found {size}"),
                });
            }
            if geo.output_attributes[..i].iter().any(|(other, _)| other == name) {
                return Err(MaterialError::DuplicateOutput {
                    stage: "geometry",
                    name: name.clone(),
                });
            }
        }
        for uniform in &geo.extra_uniforms {
            let reason = if !is_identifier(&uniform.name) {
                "is not a valid identifier".to_string()
            } else if !uniform.has_valid_size() {
                format!("cannot have size {} as {}", uniform.size, uniform.kind.name())
            } else {
                continue;
            };
            return Err(MaterialError::InvalidInterface {
                what: "geometry uniform",
                name: uniform.name.clone(),
                reason,
            });
        }

        let mut source = String::new();
        self.write_preamble(&mut source);
        let _ = writeln!(source, "layout ({}) in;", geo.input_primitive.name());
        let _ = writeln!(
            source,
            "layout ({}, max_vertices = {}) out;",
            geo.output_primitive.name(),
            geo.max_vertices
        );

        let vertex_count = geo.input_primitive.vertex_count();
        for (name, line) in &material.material_outputs.vertex_outputs {
            let size = line
                .size(graph)
                .map_err(|e| e.context(format!("vertex output '{name}'")))?;
            let _ = writeln!(source, "in {} {name}[{vertex_count}];", glsl_type(size));
        }
        for (name, size) in &geo.output_attributes {
            let _ = writeln!(source, "out {} {name};", glsl_type(*size));
        }

        let mut uniforms = geo.usage_flags.builtin_uniforms(&self.config);
        for uniform in &geo.extra_uniforms {
            if uniforms.iter().any(|existing| existing.name == uniform.name) {
                tracing::warn!("Geometry uniform '{}' is already declared", uniform.name);
                continue;
            }
            uniforms.push(uniform.clone());
        }

        let inputs: Vec<&str> = material
            .material_outputs
            .vertex_outputs
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        for (name, _) in &geo.output_attributes {
            if let Some(other) = name_conflict(name, &HashSet::new(), &uniforms, &inputs) {
                return Err(MaterialError::NameConflict {
                    output: format!("geometry output '{name}'"),
                    other,
                });
            }
        }
        write_uniforms(&mut source, &uniforms);

        source.push('\n');
        source.push_str(&geo.body);

        tracing::debug!(
            "Generated geometry stage: {} -> {}, {} uniform(s)",
            geo.input_primitive.name(),
            geo.output_primitive.name(),
            uniforms.len()
        );

        Ok(GeneratedShader {
            stage: ShaderStage::Geometry,
            source,
            uniforms,
            usage_flags: geo.usage_flags,
        })
    }

    fn write_preamble(&self, source: &mut String) {
        let _ = writeln!(source, "#version {}", self.config.glsl_version);
        if let Some(precision) = &self.config.float_precision {
            let _ = writeln!(source, "precision {precision} float;");
        }
        source.push('\n');
    }
}

struct Root<'m> {
    label: String,
    /// Declared name; `None` for `gl_Position`
    name: Option<&'m str>,
    line: &'m DataLine,
}

fn stage_roots(material: &SerializedMaterial, stage: ShaderStage) -> Result<Vec<Root<'_>>> {
    let outputs = &material.material_outputs;
    let (kind, named) = match stage {
        ShaderStage::Fragment => ("fragment", &outputs.fragment_outputs),
        _ => ("vertex", &outputs.vertex_outputs),
    };

    let mut roots = Vec::with_capacity(named.len() + 1);
    if stage == ShaderStage::Vertex {
        roots.push(Root {
            label: "vertex position".to_string(),
            name: None,
            line: &outputs.vertex_pos_output,
        });
    }
    for (name, line) in named {
        if !is_identifier(name) {
            return Err(MaterialError::InvalidOutputName(name.clone()));
        }
        roots.push(Root {
            label: format!("{kind} output '{name}'"),
            name: Some(name.as_str()),
            line,
        });
    }
    Ok(roots)
}

fn validate_vertex_layout(layout: &[VertexAttribute]) -> Result<()> {
    for (i, attribute) in layout.iter().enumerate() {
        let reason = if !is_identifier(&attribute.name) {
            "is not a valid identifier".to_string()
        } else if !(1..=MAX_COMPONENTS).contains(&attribute.size) {
            format!("must have 1 to 4 components, found {}", attribute.size)
        } else if layout[..i].iter().any(|other| other.name == attribute.name) {
            "is declared more than once".to_string()
        } else {
            continue;
        };
        return Err(MaterialError::InvalidInterface {
            what: "vertex attribute",
            name: attribute.name.clone(),
            reason,
        });
    }
    Ok(())
}

/// What else in the stage already uses `name`, if anything
fn name_conflict(
    name: &str,
    locals: &HashSet<String>,
    uniforms: &[UniformInfo],
    inputs: &[&str],
) -> Option<&'static str> {
    if locals.contains(name) {
        Some("node")
    } else if uniforms.iter().any(|uniform| uniform.name == name) {
        Some("uniform")
    } else if inputs.contains(&name) {
        Some("stage input")
    } else {
        None
    }
}

/// Label of the first root whose dependencies include `target`
fn root_reaching(graph: &MaterialGraph, roots: &[Root<'_>], target: NodeId) -> String {
    let mut seen = HashSet::new();
    for root in roots {
        let mut stack: Vec<NodeId> = root.line.as_output().map(|(id, _)| id).into_iter().collect();
        while let Some(id) = stack.pop() {
            if id == target {
                return root.label.clone();
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = graph.node(id) {
                stack.extend(node.inputs().iter().filter_map(DataLine::as_output).map(|(id, _)| id));
            }
        }
    }
    "material output".to_string()
}

fn add_uniform(
    uniforms: &mut Vec<UniformInfo>,
    uniform: UniformInfo,
    node: NodeId,
    name: &str,
) -> Result<()> {
    match uniforms.iter().find(|existing| existing.name == uniform.name) {
        None => {
            uniforms.push(uniform);
            Ok(())
        }
        Some(existing) if existing.kind == uniform.kind && existing.size == uniform.size => Ok(()),
        Some(existing) => Err(MaterialError::Validation {
            node,
            name: name.to_string(),
            message: format!(
                "uniform '{}' is already declared as {}",
                uniform.name,
                existing.glsl_type()
            ),
        }),
    }
}

fn write_uniforms(source: &mut String, uniforms: &[UniformInfo]) {
    if uniforms.is_empty() {
        return;
    }
    source.push('\n');
    for uniform in uniforms {
        source.push_str(&uniform.declaration());
        source.push('\n');
    }
}

/// Schedule of a single stage, exposed for tooling that inspects emission order
pub fn stage_schedule(
    graph: &MaterialGraph,
    material: &SerializedMaterial,
    stage: ShaderStage,
) -> Result<Schedule> {
    let roots = stage_roots(material, stage)?;
    Scheduler::new(graph).schedule_labeled(roots.iter().map(|root| (root.label.as_str(), root.line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::material::{GeoShaderData, InputPrimitive, MaterialOutputs, OutputPrimitive, VertexAttribute};
    use crate::node::NodeCatalog;
    use crate::nodes::{
        Arithmetic, ArithmeticOp, BuiltInValue, Combine, FragmentInput, MatrixKind, Normalize,
        Parameter, Swizzle, TransformPoint, VertexInput,
    };
    use crate::persist;
    use crate::uniform::UniformKind;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn compiler() -> MaterialCompiler {
        init_logging();
        MaterialCompiler::default()
    }

    fn material(outputs: MaterialOutputs) -> SerializedMaterial {
        SerializedMaterial::new(
            vec![VertexAttribute::new("position", 3), VertexAttribute::new("normal", 3)],
            outputs,
        )
    }

    fn statement_line(source: &str, name: &str) -> usize {
        source
            .lines()
            .position(|line| {
                let line = line.trim_start();
                line.split_whitespace().nth(1) == Some(name) && line.contains(" = ")
            })
            .unwrap_or_else(|| panic!("no statement for '{name}' in\n{source}"))
    }

    /// position -> transformed -> world, plus lit -> normal and tint
    fn lit_graph() -> (MaterialGraph, SerializedMaterial) {
        let mut graph = MaterialGraph::new();
        let position = graph.add_node("pos", VertexInput::new("position", 3), vec![]).unwrap();
        let normal = graph.add_node("nrm", VertexInput::new("normal", 3), vec![]).unwrap();
        let world = graph
            .add_node(
                "world",
                TransformPoint::new(MatrixKind::WorldViewProjection),
                vec![DataLine::node(position)],
            )
            .unwrap();
        let unit = graph.add_node("unit", Normalize, vec![DataLine::node(normal)]).unwrap();
        let tint = graph.add_node("tint", Parameter::new(3), vec![]).unwrap();
        let shaded = graph
            .add_node(
                "shaded",
                Arithmetic::new(ArithmeticOp::Multiply),
                vec![DataLine::node(unit), DataLine::node(tint)],
            )
            .unwrap();

        let varying = graph.add_node("v_color", FragmentInput::new("color", 3), vec![]).unwrap();
        let rgba = graph
            .add_node(
                "rgba",
                Combine::new(2).unwrap(),
                vec![DataLine::node(varying), DataLine::scalar(1.0).unwrap()],
            )
            .unwrap();

        let outputs = MaterialOutputs::new(DataLine::node(world))
            .with_vertex_output("color", DataLine::node(shaded))
            .unwrap()
            .with_fragment_output("frag_color", DataLine::node(rgba))
            .unwrap();
        (graph, material(outputs))
    }

    #[test]
    fn test_parameter_feeds_both_stages() {
        let mut graph = MaterialGraph::new();
        let p = graph.add_node("P", Parameter::new(1), vec![]).unwrap();
        let outputs = MaterialOutputs::default()
            .with_vertex_output("VOut", DataLine::node(p))
            .unwrap()
            .with_fragment_output("FOut", DataLine::node(p))
            .unwrap();
        let material = material(outputs);

        let compiled = compiler().compile(&mut graph, &material).unwrap();
        let vertex = &compiled.vertex.source;
        let fragment = &compiled.fragment.source;

        assert_eq!(vertex.matches("uniform float P;").count(), 1);
        assert!(vertex.contains("    VOut = P;\n"));
        assert_eq!(fragment.matches("uniform float P;").count(), 1);
        assert!(fragment.contains("    FOut = P;\n"));

        let p_uniform = UniformInfo::custom("P", UniformKind::Float, 1);
        assert_eq!(compiled.vertex.uniforms, vec![p_uniform.clone()]);
        assert_eq!(compiled.fragment.uniforms, vec![p_uniform.clone()]);
        assert_eq!(compiled.uniforms, vec![p_uniform]);
    }

    #[test]
    fn test_shared_dependency_is_emitted_once() {
        let mut graph = MaterialGraph::new();
        let p = graph.add_node("p", Parameter::new(4), vec![]).unwrap();
        let x = graph.add_node("x", Normalize, vec![DataLine::node(p)]).unwrap();
        let scaled = graph
            .add_node(
                "scaled",
                Arithmetic::new(ArithmeticOp::Multiply),
                vec![DataLine::node(x), DataLine::scalar(2.0).unwrap()],
            )
            .unwrap();
        let rgb = graph
            .add_node("rgb", Swizzle::new("xyz").unwrap(), vec![DataLine::node(x)])
            .unwrap();
        let outputs = MaterialOutputs::new(DataLine::node(scaled))
            .with_vertex_output("tint", DataLine::node(rgb))
            .unwrap();

        let shader = compiler()
            .generate_stage(&graph, &material(outputs), ShaderStage::Vertex)
            .unwrap();
        assert_eq!(shader.source.matches("vec4 x = normalize(p);").count(), 1);
        assert!(statement_line(&shader.source, "x") < statement_line(&shader.source, "scaled"));
        assert!(statement_line(&shader.source, "x") < statement_line(&shader.source, "rgb"));
        assert!(shader.source.contains("    gl_Position = scaled;\n"));
        assert!(shader.source.contains("out vec3 tint;"));
    }

    #[test]
    fn test_statements_follow_dependency_order() {
        let (graph, material) = lit_graph();
        let shader = compiler()
            .generate_stage(&graph, &material, ShaderStage::Vertex)
            .unwrap();
        let schedule = stage_schedule(&graph, &material, ShaderStage::Vertex).unwrap();

        for id in schedule.order() {
            let node = graph.node(*id).unwrap();
            if !shader.source.contains(&format!(" {} = ", node.name())) {
                continue;
            }
            let consumer = statement_line(&shader.source, node.name());
            for (producer, _) in node.inputs().iter().filter_map(DataLine::as_output) {
                let producer = graph.node(producer).unwrap().name();
                if shader.source.contains(&format!(" {producer} = ")) {
                    assert!(statement_line(&shader.source, producer) < consumer);
                }
            }
        }
    }

    #[test]
    fn test_vertex_stage_layout() {
        let (graph, material) = lit_graph();
        let shader = compiler()
            .generate_stage(&graph, &material, ShaderStage::Vertex)
            .unwrap();
        let source = &shader.source;

        assert!(source.starts_with("#version 330 core\n"));
        assert!(source.contains("layout (location = 0) in vec3 position;\n"));
        assert!(source.contains("layout (location = 1) in vec3 normal;\n"));
        assert!(source.contains("uniform mat4 u_wvpMatrix;\n"));
        assert!(source.contains("uniform vec3 tint;\n"));
        assert!(source.contains("    vec4 world = u_wvpMatrix * vec4(position, 1.0);\n"));
        assert!(source.contains("    vec3 shaded = unit * tint;\n"));
        assert!(source.contains("    gl_Position = world;\n    color = shaded;\n}\n"));
        assert_eq!(shader.usage_flags, MaterialUsageFlags::WVP_MATRIX);
    }

    #[test]
    fn test_fragment_stage_reads_varyings() {
        let (graph, material) = lit_graph();
        let shader = compiler()
            .generate_stage(&graph, &material, ShaderStage::Fragment)
            .unwrap();
        let source = &shader.source;

        assert!(source.contains("in vec3 color;\n"));
        assert!(source.contains("layout (location = 0) out vec4 frag_color;\n"));
        assert!(source.contains("    vec4 rgba = vec4(color, 1);\n"));
        assert!(source.contains("    frag_color = rgba;\n"));
        assert!(!source.contains("u_wvpMatrix"));
        assert!(!source.contains("tint"));
    }

    #[test]
    fn test_constant_outputs_render_inline() {
        let graph = MaterialGraph::new();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("scale", DataLine::scalar(3.5).unwrap())
            .unwrap()
            .with_fragment_output("albedo", DataLine::vec3(1.0, 2.0, 3.0).unwrap())
            .unwrap();
        let compiled = compiler().generate_material(&graph, &material(outputs)).unwrap();

        assert!(compiled.vertex.source.contains("    gl_Position = vec4(0, 0, 0, 1);\n"));
        assert!(compiled.fragment.source.contains("    scale = 3.5;\n"));
        assert!(compiled.fragment.source.contains("    albedo = vec3(1, 2, 3);\n"));
        assert!(compiled.fragment.source.contains("layout (location = 1) out vec3 albedo;\n"));
    }

    #[test]
    fn test_vertex_position_must_be_size_four() {
        let mut graph = MaterialGraph::new();
        let p = graph.add_node("p", Parameter::new(3), vec![]).unwrap();
        let outputs = MaterialOutputs::new(DataLine::node(p));
        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();

        assert!(matches!(
            err,
            MaterialError::OutputSize { expected: 4, actual: 3, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::OutputContract);
    }

    #[test]
    fn test_usage_flags_are_stage_local() {
        let mut graph = MaterialGraph::new();
        let time = graph.singleton(BuiltInValue::ElapsedTime);
        let camera = graph.singleton(BuiltInValue::CameraPosition);
        let outputs = MaterialOutputs::default()
            .with_vertex_output("eye", DataLine::node(camera))
            .unwrap()
            .with_fragment_output("pulse", DataLine::node(time))
            .unwrap();
        let compiled = compiler().generate_material(&graph, &material(outputs)).unwrap();

        assert_eq!(compiled.vertex.usage_flags, MaterialUsageFlags::CAMERA_POSITION);
        assert!(compiled.vertex.source.contains("uniform vec3 u_camPos;"));
        assert!(!compiled.vertex.source.contains("u_elapsedTime"));
        assert!(compiled.vertex.source.contains("    eye = u_camPos;\n"));

        assert_eq!(compiled.fragment.usage_flags, MaterialUsageFlags::ELAPSED_TIME);
        assert!(compiled.fragment.source.contains("uniform float u_elapsedTime;"));
        assert!(!compiled.fragment.source.contains("uniform vec3 u_camPos;"));
        assert!(compiled.uniforms.iter().all(|uniform| uniform.is_built_in));
        assert_eq!(compiled.uniforms.len(), 2);
    }

    #[test]
    fn test_repeated_input_is_not_a_cycle() {
        let mut graph = MaterialGraph::new();
        let b = graph.add_node("B", Parameter::new(2), vec![]).unwrap();
        let a = graph
            .add_node(
                "A",
                Arithmetic::new(ArithmeticOp::Add),
                vec![DataLine::node(b), DataLine::node(b)],
            )
            .unwrap();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("sum", DataLine::node(a))
            .unwrap();

        let compiled = compiler().compile(&mut graph, &material(outputs)).unwrap();
        assert!(compiled.fragment.source.contains("    vec2 A = B + B;\n"));
    }

    #[test]
    fn test_cycle_is_reported_with_both_names() {
        let mut graph = MaterialGraph::new();
        let a = graph.add_node("A", Normalize, vec![DataLine::vec3(1.0, 0.0, 0.0).unwrap()]).unwrap();
        let b = graph.add_node("B", Normalize, vec![DataLine::node(a)]).unwrap();
        graph.set_input(a, 0, DataLine::node(b)).unwrap();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("dir", DataLine::node(a))
            .unwrap();

        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();
        match &err {
            MaterialError::InfiniteLoop { consumer, producer } => {
                let mut names = [consumer.as_str(), producer.as_str()];
                names.sort_unstable();
                assert_eq!(names, ["A", "B"]);
            }
            other => panic!("expected an infinite loop, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_validation_failure_names_root_and_records_error() {
        let mut graph = MaterialGraph::new();
        let a = graph.add_node("a", Parameter::new(2), vec![]).unwrap();
        let b = graph.add_node("b", Parameter::new(3), vec![]).unwrap();
        let sum = graph
            .add_node(
                "sum",
                Arithmetic::new(ArithmeticOp::Add),
                vec![DataLine::node(a), DataLine::node(b)],
            )
            .unwrap();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("result", DataLine::node(sum))
            .unwrap();

        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.node(), Some(sum));
        assert!(
            err.to_string().starts_with("fragment output 'result': node 'sum': operands must be"),
            "{err}"
        );
        assert!(graph.node(sum).unwrap().last_error().is_some());
        assert!(graph.node(a).unwrap().last_error().is_none());
    }

    #[test]
    fn test_vertex_only_node_in_fragment_stage() {
        let mut graph = MaterialGraph::new();
        let position = graph.add_node("pos", VertexInput::new("position", 3), vec![]).unwrap();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("out_pos", DataLine::node(position))
            .unwrap();
        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();
        assert!(err.to_string().contains("cannot be read in the fragment stage"), "{err}");
    }

    #[test]
    fn test_uniform_name_conflict() {
        let mut graph = MaterialGraph::new();
        let p = graph.add_node("u_camPos", Parameter::new(1), vec![]).unwrap();
        let camera = graph.singleton(BuiltInValue::CameraPosition);
        let outputs = MaterialOutputs::default()
            .with_fragment_output("a", DataLine::node(p))
            .unwrap()
            .with_fragment_output("b", DataLine::node(camera))
            .unwrap();
        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();
        assert!(err.to_string().contains("already declared as vec3"), "{err}");
    }

    #[test]
    fn test_invalid_output_name() {
        let graph = MaterialGraph::new();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("gl_Color", DataLine::scalar(1.0).unwrap())
            .unwrap();
        let err = compiler().generate_material(&graph, &material(outputs)).unwrap_err();
        assert!(matches!(err, MaterialError::InvalidOutputName(name) if name == "gl_Color"));
    }

    #[test]
    fn test_large_constant_uses_exponent() {
        let graph = MaterialGraph::new();
        let outputs = MaterialOutputs::default()
            .with_fragment_output("big", DataLine::scalar(1.0e20).unwrap())
            .unwrap();
        let shader = compiler()
            .generate_stage(&graph, &material(outputs), ShaderStage::Fragment)
            .unwrap();
        assert!(shader.source.contains("    big = 1e20;\n"), "{}", shader.source);
    }

    #[test]
    fn test_output_shadowed_by_node_is_rejected() {
        let mut graph = MaterialGraph::new();
        let normal = graph.add_node("nrm", VertexInput::new("normal", 3), vec![]).unwrap();
        let color = graph.add_node("color", Normalize, vec![DataLine::node(normal)]).unwrap();
        let outputs = MaterialOutputs::default()
            .with_vertex_output("color", DataLine::node(color))
            .unwrap();

        let err = compiler().compile(&mut graph, &material(outputs)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputContract);
        assert!(matches!(
            &err,
            MaterialError::NameConflict { output, other: "node" } if output == "vertex output 'color'"
        ));
    }

    #[test]
    fn test_output_named_like_uniform_or_input_is_rejected() {
        let mut graph = MaterialGraph::new();
        let camera = graph.singleton(BuiltInValue::CameraPosition);
        let outputs = MaterialOutputs::default()
            .with_vertex_output("u_camPos", DataLine::node(camera))
            .unwrap();
        let err = compiler()
            .generate_stage(&graph, &material(outputs), ShaderStage::Vertex)
            .unwrap_err();
        assert!(matches!(err, MaterialError::NameConflict { other: "uniform", .. }));

        let outputs = MaterialOutputs::default()
            .with_vertex_output("normal", DataLine::vec3(0.0, 1.0, 0.0).unwrap())
            .unwrap();
        let err = compiler()
            .generate_stage(&graph, &material(outputs), ShaderStage::Vertex)
            .unwrap_err();
        assert!(matches!(err, MaterialError::NameConflict { other: "stage input", .. }));

        let outputs = MaterialOutputs::default()
            .with_vertex_output("shade", DataLine::scalar(1.0).unwrap())
            .unwrap()
            .with_fragment_output("shade", DataLine::scalar(1.0).unwrap())
            .unwrap();
        let err = compiler().generate_material(&graph, &material(outputs)).unwrap_err();
        assert!(err.to_string().starts_with("fragment output 'shade' collides"), "{err}");
    }

    #[test]
    fn test_vertex_layout_is_validated() {
        let graph = MaterialGraph::new();
        let mut material = material(MaterialOutputs::default());
        material.vertex_input_layout.push(VertexAttribute::new("position", 2));
        let err = compiler()
            .generate_stage(&graph, &material, ShaderStage::Vertex)
            .unwrap_err();
        assert_eq!(err.to_string(), "vertex attribute 'position' is declared more than once");

        material.vertex_input_layout = vec![VertexAttribute::new("uv", 0)];
        let err = compiler()
            .generate_stage(&graph, &material, ShaderStage::Vertex)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputContract);
        assert!(err.to_string().contains("must have 1 to 4 components"), "{err}");

        material.vertex_input_layout = vec![VertexAttribute::new("2d", 2)];
        assert!(compiler()
            .generate_stage(&graph, &material, ShaderStage::Vertex)
            .is_err());
    }

    #[test]
    fn test_geometry_interface_is_validated() {
        let (graph, material) = lit_graph();
        let geometry = GeoShaderData {
            max_vertices: 3,
            output_attributes: vec![("g_color".to_string(), 3)],
            body: "void main() {}\n".to_string(),
            ..GeoShaderData::default()
        };
        let compile = |geo: GeoShaderData| {
            compiler().generate_geometry(&graph, &material.clone().with_geometry(geo))
        };
        assert!(compile(geometry.clone()).is_ok());

        let err = compile(GeoShaderData {
            extra_uniforms: vec![UniformInfo::custom("wobble", UniformKind::Float, 0)],
            ..geometry.clone()
        })
        .unwrap_err();
        assert!(matches!(
            &err,
            MaterialError::InvalidInterface { what: "geometry uniform", name, .. } if name == "wobble"
        ));

        let err = compile(GeoShaderData {
            extra_uniforms: vec![UniformInfo::custom("bad name", UniformKind::Float, 1)],
            ..geometry.clone()
        })
        .unwrap_err();
        assert!(err.to_string().contains("is not a valid identifier"), "{err}");

        let err = compile(GeoShaderData {
            output_attributes: vec![("g_color".to_string(), 0)],
            ..geometry.clone()
        })
        .unwrap_err();
        assert!(matches!(err, MaterialError::InvalidInterface { what: "geometry output", .. }));

        let err = compile(GeoShaderData {
            output_attributes: vec![("g_color".to_string(), 3), ("g_color".to_string(), 3)],
            ..geometry.clone()
        })
        .unwrap_err();
        assert!(matches!(err, MaterialError::DuplicateOutput { stage: "geometry", .. }));

        let err = compile(GeoShaderData {
            output_attributes: vec![("color".to_string(), 3)],
            ..geometry
        })
        .unwrap_err();
        assert!(matches!(err, MaterialError::NameConflict { other: "stage input", .. }));
    }

    #[test]
    fn test_geometry_stage() {
        let (graph, mut material) = lit_graph();
        material.material_outputs.fragment_outputs =
            vec![("frag_color".to_string(), DataLine::vec4(1.0, 1.0, 1.0, 1.0).unwrap())];
        let body = "void main()\n{\n    for (int i = 0; i < 3; ++i) {\n        g_color = color[i];\n        gl_Position = gl_in[i].gl_Position;\n        EmitVertex();\n    }\n    EndPrimitive();\n}\n";
        let material = material.with_geometry(GeoShaderData {
            input_primitive: InputPrimitive::Triangles,
            output_primitive: OutputPrimitive::TriangleStrip,
            max_vertices: 3,
            output_attributes: vec![("g_color".to_string(), 3)],
            usage_flags: MaterialUsageFlags::ELAPSED_TIME,
            extra_uniforms: vec![UniformInfo::custom("wobble", UniformKind::Float, 1)],
            body: body.to_string(),
        });

        let compiled = compiler().generate_material(&graph, &material).unwrap();
        let geometry = compiled.geometry.expect("geometry stage");
        let source = &geometry.source;
        assert!(source.contains("layout (triangles) in;\n"));
        assert!(source.contains("layout (triangle_strip, max_vertices = 3) out;\n"));
        assert!(source.contains("in vec3 color[3];\n"));
        assert!(source.contains("out vec3 g_color;\n"));
        assert!(source.contains("uniform float u_elapsedTime;\nuniform float wobble;\n"));
        assert!(source.ends_with(body));

        // The fragment stage now reads the geometry outputs.
        assert!(!compiled.fragment.source.contains("in vec3 color;"));
        assert!(compiled.fragment.source.contains("in vec3 g_color;"));
        assert!(compiled.uniforms.iter().any(|uniform| uniform.name == "wobble"));
    }

    #[test]
    fn test_invalid_geometry_is_skipped() {
        let (graph, material) = lit_graph();
        let material = material.with_geometry(GeoShaderData {
            max_vertices: 0,
            body: "void main() {}\n".to_string(),
            ..GeoShaderData::default()
        });
        let compiled = compiler().generate_material(&graph, &material).unwrap();
        assert!(compiled.geometry.is_none());
        assert!(matches!(
            compiler().generate_geometry(&graph, &material),
            Err(MaterialError::InvalidGeometryShader)
        ));
    }

    #[test]
    fn test_precision_line() {
        let graph = MaterialGraph::new();
        let compiler = MaterialCompiler::new(GeneratorConfig {
            glsl_version: "300 es".to_string(),
            float_precision: Some("mediump".to_string()),
            ..GeneratorConfig::default()
        });
        let shader = compiler
            .generate_stage(&graph, &material(MaterialOutputs::default()), ShaderStage::Fragment)
            .unwrap();
        assert!(shader.source.starts_with("#version 300 es\nprecision mediump float;\n"));
    }

    #[test]
    fn test_round_trip_gives_identical_source() {
        let (mut graph, material) = lit_graph();
        let compiler = compiler();
        let original = compiler.compile(&mut graph, &material).unwrap();
        let catalog = NodeCatalog::standard();

        let text = persist::save_ron(&graph, &material).unwrap();
        let mut from_text = MaterialGraph::new();
        let loaded = persist::load_ron(&text, &mut from_text, &catalog).unwrap();
        assert_eq!(from_text.node_count(), graph.node_count());
        assert_eq!(compiler.compile(&mut from_text, &loaded).unwrap(), original);

        let bytes = persist::save_binary(&graph, &material).unwrap();
        let mut from_bytes = MaterialGraph::new();
        let loaded = persist::load_binary(&bytes, &mut from_bytes, &catalog).unwrap();
        assert_eq!(compiler.compile(&mut from_bytes, &loaded).unwrap(), original);
    }
}
