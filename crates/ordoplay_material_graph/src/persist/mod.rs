// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material persistence.
//!
//! The graph never sees a wire format. It reads and writes through the
//! object-safe [`DataWriter`] / [`DataReader`] capabilities; [`tree`]
//! provides one backend with text (RON) and binary (bincode) encodings.
//!
//! Node records are written producers first, so every reference a record
//! makes can be resolved by name while reading.

pub mod tree;

pub use tree::{DataValue, Field, TreeReader, TreeWriter};

use crate::data_line::{DataLine, MAX_COMPONENTS};
use crate::error::{MaterialError, Result};
use crate::graph::MaterialGraph;
use crate::material::{
    GeoShaderData, InputPrimitive, MaterialOutputs, OutputPrimitive, SerializedMaterial,
    VertexAttribute,
};
use crate::node::{NodeCatalog, NodeId};
use crate::nodes::BuiltInValue;
use crate::scheduler::Scheduler;
use crate::uniform::{UniformInfo, UniformKind};
use crate::usage::MaterialUsageFlags;

/// Version written into every material record
pub const FORMAT_VERSION: u32 = 1;

/// Sink for persisted values
pub trait DataWriter {
    /// Write an unsigned integer field
    fn write_uint(&mut self, name: &str, value: u32) -> Result<()>;
    /// Write a string field
    fn write_string(&mut self, name: &str, value: &str) -> Result<()>;
    /// Write a boolean field
    fn write_bool(&mut self, name: &str, value: bool) -> Result<()>;
    /// Write a float field
    fn write_float(&mut self, name: &str, value: f32) -> Result<()>;
    /// Open a nested structure
    fn begin_structure(&mut self, name: &str) -> Result<()>;
    /// Close the innermost structure
    fn end_structure(&mut self) -> Result<()>;
    /// Open a collection of `len` elements
    fn begin_collection(&mut self, name: &str, len: usize) -> Result<()>;
    /// Close the innermost collection
    fn end_collection(&mut self) -> Result<()>;
}

/// Source of persisted values, read back in the order they were written
pub trait DataReader {
    /// Read an unsigned integer field
    fn read_uint(&mut self, name: &str) -> Result<u32>;
    /// Read a string field
    fn read_string(&mut self, name: &str) -> Result<String>;
    /// Read a boolean field
    fn read_bool(&mut self, name: &str) -> Result<bool>;
    /// Read a float field
    fn read_float(&mut self, name: &str) -> Result<f32>;
    /// Enter a nested structure
    fn begin_structure(&mut self, name: &str) -> Result<()>;
    /// Leave the innermost structure
    fn end_structure(&mut self) -> Result<()>;
    /// Enter a collection, returning its element count
    fn begin_collection(&mut self, name: &str) -> Result<usize>;
    /// Leave the innermost collection
    fn end_collection(&mut self) -> Result<()>;
}

/// A value that writes itself as the body of a structure
pub trait Writable {
    /// Write every field
    fn write_data(&self, writer: &mut dyn DataWriter) -> Result<()>;
}

/// A value that reads itself from the body of a structure
pub trait Readable: Sized {
    /// Read every field
    fn read_data(reader: &mut dyn DataReader) -> Result<Self>;
}

impl dyn DataWriter + '_ {
    /// Write `value` as a named structure
    pub fn write_data_structure(&mut self, name: &str, value: &dyn Writable) -> Result<()> {
        self.begin_structure(name)?;
        value.write_data(self)?;
        self.end_structure()
    }

    /// Write a named collection, one `write_element` call per item
    pub fn write_collection<T>(
        &mut self,
        name: &str,
        items: &[T],
        mut write_element: impl FnMut(&mut dyn DataWriter, &T) -> Result<()>,
    ) -> Result<()> {
        self.begin_collection(name, items.len())?;
        for item in items {
            write_element(self, item)?;
        }
        self.end_collection()
    }
}

impl dyn DataReader + '_ {
    /// Read a named structure into `T`
    pub fn read_data_structure<T: Readable>(&mut self, name: &str) -> Result<T> {
        self.begin_structure(name)?;
        let value = T::read_data(self)?;
        self.end_structure()?;
        Ok(value)
    }

    /// Read a named collection, one `read_element` call per item
    pub fn read_collection<T>(
        &mut self,
        name: &str,
        mut read_element: impl FnMut(&mut dyn DataReader, usize) -> Result<T>,
    ) -> Result<Vec<T>> {
        let len = self.begin_collection(name)?;
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            items.push(read_element(self, index)?);
        }
        self.end_collection()?;
        Ok(items)
    }
}

impl Writable for VertexAttribute {
    fn write_data(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("name", &self.name)?;
        writer.write_uint("size", self.size as u32)?;
        writer.write_bool("normalized", self.normalized)
    }
}

impl Readable for VertexAttribute {
    fn read_data(reader: &mut dyn DataReader) -> Result<Self> {
        Ok(Self {
            name: reader.read_string("name")?,
            size: read_component_count(reader, "size")?,
            normalized: reader.read_bool("normalized")?,
        })
    }
}

impl Writable for UniformInfo {
    fn write_data(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("name", &self.name)?;
        writer.write_string("kind", self.kind.name())?;
        writer.write_uint("size", self.size as u32)?;
        writer.write_bool("is_built_in", self.is_built_in)
    }
}

impl Readable for UniformInfo {
    fn read_data(reader: &mut dyn DataReader) -> Result<Self> {
        let name = reader.read_string("name")?;
        let kind_name = reader.read_string("kind")?;
        let kind = UniformKind::from_name(&kind_name)
            .ok_or_else(|| MaterialError::Io(format!("unknown uniform kind '{kind_name}'")))?;
        Ok(Self {
            name,
            kind,
            size: reader.read_uint("size")? as usize,
            is_built_in: reader.read_bool("is_built_in")?,
        })
    }
}

impl Writable for GeoShaderData {
    fn write_data(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("input_primitive", self.input_primitive.name())?;
        writer.write_string("output_primitive", self.output_primitive.name())?;
        writer.write_uint("max_vertices", self.max_vertices)?;
        writer.write_collection("output_attributes", &self.output_attributes, |w, (name, size)| {
            w.begin_structure("attribute")?;
            w.write_string("name", name)?;
            w.write_uint("size", *size as u32)?;
            w.end_structure()
        })?;
        writer.write_uint("usage_flags", self.usage_flags.bits())?;
        writer.write_collection("extra_uniforms", &self.extra_uniforms, |w, uniform| {
            w.write_data_structure("uniform", uniform)
        })?;
        writer.write_string("body", &self.body)
    }
}

impl Readable for GeoShaderData {
    fn read_data(reader: &mut dyn DataReader) -> Result<Self> {
        let input = reader.read_string("input_primitive")?;
        let input_primitive = InputPrimitive::from_name(&input)
            .ok_or_else(|| MaterialError::Io(format!("unknown input primitive '{input}'")))?;
        let output = reader.read_string("output_primitive")?;
        let output_primitive = OutputPrimitive::from_name(&output)
            .ok_or_else(|| MaterialError::Io(format!("unknown output primitive '{output}'")))?;
        let max_vertices = reader.read_uint("max_vertices")?;
        let output_attributes = reader.read_collection("output_attributes", |r, _| {
            r.begin_structure("attribute")?;
            let name = r.read_string("name")?;
            let size = read_component_count(r, "size")?;
            r.end_structure()?;
            Ok((name, size))
        })?;
        let bits = reader.read_uint("usage_flags")?;
        let usage_flags = MaterialUsageFlags::from_bits(bits)
            .ok_or_else(|| MaterialError::Io(format!("invalid usage flags {bits:#x}")))?;
        let extra_uniforms =
            reader.read_collection("extra_uniforms", |r, _| r.read_data_structure("uniform"))?;
        Ok(Self {
            input_primitive,
            output_primitive,
            max_vertices,
            output_attributes,
            usage_flags,
            extra_uniforms,
            body: reader.read_string("body")?,
        })
    }
}

fn read_component_count(reader: &mut dyn DataReader, name: &str) -> Result<usize> {
    let size = reader.read_uint(name)? as usize;
    if (1..=MAX_COMPONENTS).contains(&size) {
        Ok(size)
    } else {
        Err(MaterialError::Io(format!("'{name}' must be between 1 and 4, found {size}")))
    }
}

fn write_line(writer: &mut dyn DataWriter, graph: &MaterialGraph, line: &DataLine) -> Result<()> {
    match line {
        DataLine::Constant(value) => {
            writer.write_bool("is_constant", true)?;
            writer.write_collection("values", value.values(), |w, v| w.write_float("value", *v))
        }
        DataLine::Output { node, index } => {
            let producer = graph.node(*node).ok_or_else(|| MaterialError::DanglingReference {
                consumer: "material record".to_string(),
                missing: graph.display_name(*node),
            })?;
            writer.write_bool("is_constant", false)?;
            writer.write_string("node_name", producer.name())?;
            writer.write_uint("output_index", *index as u32)
        }
    }
}

fn read_line(reader: &mut dyn DataReader, graph: &mut MaterialGraph) -> Result<DataLine> {
    if reader.read_bool("is_constant")? {
        let values = reader.read_collection("values", |r, _| r.read_float("value"))?;
        return Ok(DataLine::constant(&values)?);
    }
    let name = reader.read_string("node_name")?;
    let index = reader.read_uint("output_index")? as usize;
    let node = match BuiltInValue::from_type_name(&name) {
        Some(value) => graph.singleton(value),
        None => graph.node_by_name(&name).ok_or_else(|| MaterialError::DanglingReference {
            consumer: "material record".to_string(),
            missing: name.clone(),
        })?,
    };
    Ok(DataLine::output(node, index))
}

fn write_named_lines(
    writer: &mut dyn DataWriter,
    graph: &MaterialGraph,
    name: &str,
    lines: &[(String, DataLine)],
) -> Result<()> {
    writer.write_collection(name, lines, |w, (output, line)| {
        w.begin_structure("output")?;
        w.write_string("name", output)?;
        w.begin_structure("line")?;
        write_line(w, graph, line)?;
        w.end_structure()?;
        w.end_structure()
    })
}

fn read_named_lines(
    reader: &mut dyn DataReader,
    graph: &mut MaterialGraph,
    name: &str,
) -> Result<Vec<(String, DataLine)>> {
    reader.read_collection(name, |r, _| {
        r.begin_structure("output")?;
        let output = r.read_string("name")?;
        r.begin_structure("line")?;
        let line = read_line(r, graph)?;
        r.end_structure()?;
        r.end_structure()?;
        Ok((output, line))
    })
}

/// Write every live node of `graph` and the material that references it
pub fn write_material(
    writer: &mut dyn DataWriter,
    graph: &MaterialGraph,
    material: &SerializedMaterial,
) -> Result<()> {
    // Every node is its own root so unreachable nodes are kept too.
    let roots: Vec<DataLine> = graph
        .nodes()
        .filter(|(_, node)| !node.is_singleton())
        .map(|(id, _)| DataLine::node(id))
        .collect();
    let schedule = Scheduler::new(graph)
        .schedule(&roots)
        .map_err(|e| e.context("Error ordering nodes"))?;

    writer.write_uint("version", FORMAT_VERSION)?;
    let builtins: Vec<&'static str> = graph.builtins().map(BuiltInValue::type_name).collect();
    writer.write_collection("singletons", &builtins, |w, type_name| {
        w.write_string("type_name", type_name)
    })?;
    writer.write_collection("nodes", schedule.order(), |w, id| {
        write_node(w, graph, *id)
            .map_err(|e| e.context(format!("Error writing node '{}'", graph.display_name(*id))))
    })?;

    writer.write_collection("vertex_input_layout", &material.vertex_input_layout, |w, attribute| {
        w.write_data_structure("attribute", attribute)
    })?;

    let outputs = &material.material_outputs;
    writer.begin_structure("material_outputs")?;
    writer.begin_structure("vertex_pos_output")?;
    write_line(writer, graph, &outputs.vertex_pos_output)?;
    writer.end_structure()?;
    write_named_lines(writer, graph, "vertex_outputs", &outputs.vertex_outputs)?;
    write_named_lines(writer, graph, "fragment_outputs", &outputs.fragment_outputs)?;
    writer.end_structure()?;

    writer.write_data_structure("geo_shader", &material.geo_shader)?;

    tracing::debug!("Wrote material with {} node(s)", schedule.len());
    Ok(())
}

fn write_node(writer: &mut dyn DataWriter, graph: &MaterialGraph, id: NodeId) -> Result<()> {
    let node = graph.node(id).ok_or_else(|| MaterialError::DanglingReference {
        consumer: "material record".to_string(),
        missing: graph.display_name(id),
    })?;
    writer.begin_structure("node")?;
    writer.write_string("name", node.name())?;
    writer.write_string("type_name", node.type_name())?;
    writer.write_collection("inputs", node.inputs(), |w, line| {
        w.begin_structure("input")?;
        write_line(w, graph, line)?;
        w.end_structure()
    })?;
    writer.begin_structure("fields")?;
    node.kind().as_node().write_fields(writer)?;
    writer.end_structure()?;
    writer.end_structure()
}

/// Rebuild `graph` from a material record and return the material
///
/// The graph is cleared first; node handles taken before the call are
/// invalidated.
pub fn read_material(
    reader: &mut dyn DataReader,
    graph: &mut MaterialGraph,
    catalog: &NodeCatalog,
) -> Result<SerializedMaterial> {
    graph.clear();

    let version = reader.read_uint("version")?;
    if version != FORMAT_VERSION {
        return Err(MaterialError::Io(format!(
            "unsupported material format version {version}, expected {FORMAT_VERSION}"
        )));
    }

    reader
        .read_collection("singletons", |r, _| {
            let type_name = r.read_string("type_name")?;
            let value = BuiltInValue::from_type_name(&type_name)
                .ok_or(MaterialError::UnknownNodeType(type_name))?;
            Ok(graph.singleton(value))
        })
        .map_err(|e| e.context("Error reading built-in values"))?;

    let nodes = reader.read_collection("nodes", |r, index| {
        read_node(r, graph, catalog).map_err(|e| e.context(format!("Error reading node {index}")))
    })?;

    let layout = reader
        .read_collection("vertex_input_layout", |r, _| r.read_data_structure("attribute"))
        .map_err(|e| e.context("Error reading vertex input layout"))?;

    let outputs = read_outputs(reader, graph).map_err(|e| e.context("Error reading material outputs"))?;

    let geo_shader: GeoShaderData = reader
        .read_data_structure("geo_shader")
        .map_err(|e| e.context("Error reading geometry shader"))?;

    tracing::debug!("Read material with {} node(s)", nodes.len());
    Ok(SerializedMaterial::new(layout, outputs).with_geometry(geo_shader))
}

fn read_node(
    reader: &mut dyn DataReader,
    graph: &mut MaterialGraph,
    catalog: &NodeCatalog,
) -> Result<NodeId> {
    reader.begin_structure("node")?;
    let name = reader.read_string("name")?;
    let type_name = reader.read_string("type_name")?;
    let inputs = reader.read_collection("inputs", |r, _| {
        r.begin_structure("input")?;
        let line = read_line(r, graph)?;
        r.end_structure()?;
        Ok(line)
    })?;
    reader.begin_structure("fields")?;
    let kind = catalog
        .construct(&type_name, reader)
        .map_err(|e| e.context(format!("Error setting parameters for node '{name}'")))?;
    reader.end_structure()?;
    reader.end_structure()?;
    Ok(graph.add_node(name, kind, inputs)?)
}

fn read_outputs(reader: &mut dyn DataReader, graph: &mut MaterialGraph) -> Result<MaterialOutputs> {
    reader.begin_structure("material_outputs")?;
    reader.begin_structure("vertex_pos_output")?;
    let mut outputs = MaterialOutputs::new(read_line(reader, graph)?);
    reader.end_structure()?;
    for (name, line) in read_named_lines(reader, graph, "vertex_outputs")? {
        outputs.add_vertex_output(name, line)?;
    }
    for (name, line) in read_named_lines(reader, graph, "fragment_outputs")? {
        outputs.add_fragment_output(name, line)?;
    }
    reader.end_structure()?;
    Ok(outputs)
}

/// Serialise a material as RON text
pub fn save_ron(graph: &MaterialGraph, material: &SerializedMaterial) -> Result<String> {
    let mut writer = TreeWriter::new();
    write_material(&mut writer, graph, material)?;
    writer.finish()?.to_ron()
}

/// Rebuild a material from RON text
pub fn load_ron(
    text: &str,
    graph: &mut MaterialGraph,
    catalog: &NodeCatalog,
) -> Result<SerializedMaterial> {
    let mut reader = TreeReader::new(DataValue::from_ron(text)?)?;
    read_material(&mut reader, graph, catalog)
}

/// Serialise a material as bincode
pub fn save_binary(graph: &MaterialGraph, material: &SerializedMaterial) -> Result<Vec<u8>> {
    let mut writer = TreeWriter::new();
    write_material(&mut writer, graph, material)?;
    writer.finish()?.to_binary()
}

/// Rebuild a material from bincode
pub fn load_binary(
    bytes: &[u8],
    graph: &mut MaterialGraph,
    catalog: &NodeCatalog,
) -> Result<SerializedMaterial> {
    let mut reader = TreeReader::new(DataValue::from_binary(bytes)?)?;
    read_material(&mut reader, graph, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Arithmetic, ArithmeticOp, Parameter, Split, Swizzle};

    fn sample() -> (MaterialGraph, SerializedMaterial) {
        let mut graph = MaterialGraph::new();
        let color = graph.add_node("color", Parameter::new(3), vec![]).unwrap();
        let time = graph.singleton(BuiltInValue::ElapsedTime);
        let split = graph.add_node("parts", Split::new(3), vec![DataLine::node(color)]).unwrap();
        let scaled = graph
            .add_node(
                "scaled",
                Arithmetic::new(ArithmeticOp::Multiply),
                vec![DataLine::output(split, 1), DataLine::node(time)],
            )
            .unwrap();
        graph
            .add_node("unused", Swizzle::new("zyx").unwrap(), vec![DataLine::node(color)])
            .unwrap();

        let outputs = MaterialOutputs::new(DataLine::vec4(0.0, 0.0, 0.0, 1.0).unwrap())
            .with_vertex_output("tint", DataLine::node(scaled))
            .unwrap()
            .with_fragment_output("color", DataLine::vec3(1.0, 0.5, 0.25).unwrap())
            .unwrap();
        let material = SerializedMaterial::new(
            vec![VertexAttribute::new("position", 3), VertexAttribute::new("uv", 2).normalized()],
            outputs,
        );
        (graph, material)
    }

    fn wiring(graph: &MaterialGraph) -> Vec<(String, &'static str, Vec<String>)> {
        let mut nodes: Vec<_> = graph
            .nodes()
            .map(|(_, node)| {
                let inputs = node
                    .inputs()
                    .iter()
                    .map(|line| match line.as_output() {
                        Some((id, index)) => format!("{}:{index}", graph.display_name(id)),
                        None => format!("{line:?}"),
                    })
                    .collect();
                (node.name().to_string(), node.type_name(), inputs)
            })
            .collect();
        nodes.sort();
        nodes
    }

    #[test]
    fn test_unreferenced_builtin_survives_round_trip() {
        let (mut graph, material) = sample();
        graph.singleton(BuiltInValue::CameraPosition);
        let text = save_ron(&graph, &material).unwrap();

        let mut restored = MaterialGraph::new();
        load_ron(&text, &mut restored, &NodeCatalog::standard()).unwrap();
        assert_eq!(restored.node_count(), graph.node_count());
        assert!(restored.node_by_name("CameraPosition").is_some());
        assert_eq!(
            restored.builtins().collect::<Vec<_>>(),
            [BuiltInValue::ElapsedTime, BuiltInValue::CameraPosition]
        );
    }

    #[test]
    fn test_ron_round_trip_preserves_wiring() {
        let (graph, material) = sample();
        let text = save_ron(&graph, &material).unwrap();

        let mut restored = MaterialGraph::new();
        let loaded = load_ron(&text, &mut restored, &NodeCatalog::standard()).unwrap();

        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(wiring(&restored), wiring(&graph));
        assert_eq!(loaded.vertex_input_layout, material.vertex_input_layout);
        assert_eq!(loaded.material_outputs.fragment_outputs, material.material_outputs.fragment_outputs);
        assert_eq!(loaded.geo_shader, material.geo_shader);
    }

    #[test]
    fn test_binary_round_trip_preserves_wiring() {
        let (graph, material) = sample();
        let bytes = save_binary(&graph, &material).unwrap();

        let mut restored = MaterialGraph::new();
        load_binary(&bytes, &mut restored, &NodeCatalog::standard()).unwrap();
        assert_eq!(wiring(&restored), wiring(&graph));
    }

    #[test]
    fn test_records_are_written_producers_first() {
        let (graph, material) = sample();
        let mut writer = TreeWriter::new();
        write_material(&mut writer, &graph, &material).unwrap();
        let DataValue::Structure(fields) = writer.finish().unwrap() else {
            panic!("root must be a structure");
        };
        let DataValue::Collection(nodes) = &fields[2].value else {
            panic!("nodes must be a collection");
        };
        let names: Vec<&str> = nodes
            .iter()
            .map(|node| match &node.value {
                DataValue::Structure(fields) => match &fields[0].value {
                    DataValue::String(name) => name.as_str(),
                    other => panic!("unexpected {other:?}"),
                },
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(position("color") < position("parts"));
        assert!(position("parts") < position("scaled"));
        assert!(position("color") < position("unused"));
    }

    #[test]
    fn test_unknown_type_name_reports_node_index() {
        let (graph, material) = sample();
        let text = save_ron(&graph, &material)
            .unwrap()
            .replace("\"Swizzle\"", "\"Teapot\"");

        let mut restored = MaterialGraph::new();
        let err = load_ron(&text, &mut restored, &NodeCatalog::standard()).unwrap_err();
        assert!(err.to_string().starts_with("Error reading node"), "{err}");
        assert!(matches!(err.root_cause(), MaterialError::UnknownNodeType(name) if name == "Teapot"));
    }

    #[test]
    fn test_missing_producer_is_structural() {
        let mut writer = TreeWriter::new();
        {
            let w: &mut dyn DataWriter = &mut writer;
            w.write_uint("version", FORMAT_VERSION).unwrap();
            w.write_collection("singletons", &[] as &[&str], |w, type_name| {
                w.write_string("type_name", type_name)
            })
            .unwrap();
            w.write_collection("nodes", &["n"], |w, name| {
                w.begin_structure("node")?;
                w.write_string("name", name)?;
                w.write_string("type_name", "Normalize")?;
                w.write_collection("inputs", &["ghost"], |w, producer| {
                    w.begin_structure("input")?;
                    w.write_bool("is_constant", false)?;
                    w.write_string("node_name", producer)?;
                    w.write_uint("output_index", 0)?;
                    w.end_structure()
                })?;
                w.begin_structure("fields")?;
                w.end_structure()?;
                w.end_structure()
            })
            .unwrap();
        }
        let mut reader = TreeReader::new(writer.finish().unwrap()).unwrap();
        let err = read_material(&mut reader, &mut MaterialGraph::new(), &NodeCatalog::standard())
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Structural);
        assert!(err.to_string().starts_with("Error reading node 0"), "{err}");
        assert!(
            matches!(err.root_cause(), MaterialError::DanglingReference { missing, .. } if missing == "ghost")
        );
    }

    #[test]
    fn test_version_mismatch() {
        let mut writer = TreeWriter::new();
        writer.write_uint("version", FORMAT_VERSION + 1).unwrap();
        let mut reader = TreeReader::new(writer.finish().unwrap()).unwrap();
        let err = read_material(&mut reader, &mut MaterialGraph::new(), &NodeCatalog::standard())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported material format version"));
    }
}
