// SPDX-License-Identifier: MIT OR Apache-2.0
//! Material intermediate representation.
//!
//! A [`SerializedMaterial`] is the unit that is persisted and fed to the
//! compiler: the vertex input layout, the root outputs anchoring the node
//! graph, and optional author-supplied geometry stage data.

use crate::data_line::{ConstantValue, DataLine};
use crate::error::{MaterialError, Result};
use crate::uniform::UniformInfo;
use crate::usage::MaterialUsageFlags;

/// One attribute of the vertex input layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute name in the vertex stage
    pub name: String,
    /// Component count (1..=4)
    pub size: usize,
    /// Whether integer data is normalized when fetched
    pub normalized: bool,
}

impl VertexAttribute {
    /// Create a non-normalized attribute
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            normalized: false,
        }
    }

    /// Mark as normalized
    pub fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }
}

/// The root data lines of a material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialOutputs {
    /// Clip-space position, must be size 4
    pub vertex_pos_output: DataLine,
    /// Named vertex-stage outputs (varyings)
    pub vertex_outputs: Vec<(String, DataLine)>,
    /// Named fragment-stage outputs (render targets)
    pub fragment_outputs: Vec<(String, DataLine)>,
}

impl MaterialOutputs {
    /// Create outputs with only a vertex position
    pub fn new(vertex_pos_output: DataLine) -> Self {
        Self {
            vertex_pos_output,
            vertex_outputs: Vec::new(),
            fragment_outputs: Vec::new(),
        }
    }

    /// Add a named vertex output
    pub fn add_vertex_output(&mut self, name: impl Into<String>, line: DataLine) -> Result<()> {
        push_unique(&mut self.vertex_outputs, "vertex", name.into(), line)
    }

    /// Add a named fragment output
    pub fn add_fragment_output(&mut self, name: impl Into<String>, line: DataLine) -> Result<()> {
        push_unique(&mut self.fragment_outputs, "fragment", name.into(), line)
    }

    /// Builder form of [`Self::add_vertex_output`]
    pub fn with_vertex_output(mut self, name: impl Into<String>, line: DataLine) -> Result<Self> {
        self.add_vertex_output(name, line)?;
        Ok(self)
    }

    /// Builder form of [`Self::add_fragment_output`]
    pub fn with_fragment_output(mut self, name: impl Into<String>, line: DataLine) -> Result<Self> {
        self.add_fragment_output(name, line)?;
        Ok(self)
    }

    /// Look up a vertex output by name
    pub fn vertex_output(&self, name: &str) -> Option<&DataLine> {
        self.vertex_outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, line)| line)
    }

    /// Every root line: vertex position, vertex outputs, fragment outputs
    pub fn roots(&self) -> impl Iterator<Item = &DataLine> {
        std::iter::once(&self.vertex_pos_output)
            .chain(self.vertex_outputs.iter().map(|(_, line)| line))
            .chain(self.fragment_outputs.iter().map(|(_, line)| line))
    }
}

impl Default for MaterialOutputs {
    fn default() -> Self {
        Self::new(DataLine::Constant(ConstantValue::ORIGIN))
    }
}

fn push_unique(
    list: &mut Vec<(String, DataLine)>,
    stage: &'static str,
    name: String,
    line: DataLine,
) -> Result<()> {
    if list.iter().any(|(existing, _)| *existing == name) {
        return Err(MaterialError::DuplicateOutput { stage, name });
    }
    list.push((name, line));
    Ok(())
}

/// Primitive consumed by a geometry stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputPrimitive {
    /// Single points
    Points,
    /// Line segments
    Lines,
    /// Line segments with adjacency
    LinesAdjacency,
    /// Triangles
    #[default]
    Triangles,
    /// Triangles with adjacency
    TrianglesAdjacency,
}

impl InputPrimitive {
    /// GLSL layout qualifier
    pub fn name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Lines => "lines",
            Self::LinesAdjacency => "lines_adjacency",
            Self::Triangles => "triangles",
            Self::TrianglesAdjacency => "triangles_adjacency",
        }
    }

    /// Parse a layout qualifier
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Points,
            Self::Lines,
            Self::LinesAdjacency,
            Self::Triangles,
            Self::TrianglesAdjacency,
        ]
        .into_iter()
        .find(|primitive| primitive.name() == name)
    }

    /// Vertices per input primitive
    pub fn vertex_count(self) -> usize {
        match self {
            Self::Points => 1,
            Self::Lines => 2,
            Self::LinesAdjacency => 4,
            Self::Triangles => 3,
            Self::TrianglesAdjacency => 6,
        }
    }
}

/// Primitive emitted by a geometry stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputPrimitive {
    /// Points
    Points,
    /// Line strips
    LineStrip,
    /// Triangle strips
    #[default]
    TriangleStrip,
}

impl OutputPrimitive {
    /// GLSL layout qualifier
    pub fn name(self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::LineStrip => "line_strip",
            Self::TriangleStrip => "triangle_strip",
        }
    }

    /// Parse a layout qualifier
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Points, Self::LineStrip, Self::TriangleStrip]
            .into_iter()
            .find(|primitive| primitive.name() == name)
    }
}

/// Author-supplied geometry stage
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoShaderData {
    /// Primitive read from the vertex stage
    pub input_primitive: InputPrimitive,
    /// Primitive written to the rasterizer
    pub output_primitive: OutputPrimitive,
    /// Upper bound on emitted vertices
    pub max_vertices: u32,
    /// Attributes written for the fragment stage
    pub output_attributes: Vec<(String, usize)>,
    /// Built-in values the body reads
    pub usage_flags: MaterialUsageFlags,
    /// Custom uniforms the body reads
    pub extra_uniforms: Vec<UniformInfo>,
    /// Verbatim GLSL spliced after the declarations
    pub body: String,
}

impl GeoShaderData {
    /// Whether this describes a stage that can be generated
    pub fn is_valid(&self) -> bool {
        !self.body.is_empty() && self.max_vertices > 0
    }
}

/// The compiler's input: vertex layout, root outputs and geometry data
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedMaterial {
    /// Vertex attributes, in location order
    pub vertex_input_layout: Vec<VertexAttribute>,
    /// Root outputs
    pub material_outputs: MaterialOutputs,
    /// Optional geometry stage
    pub geo_shader: GeoShaderData,
}

impl SerializedMaterial {
    /// Create a material without a geometry stage
    pub fn new(vertex_input_layout: Vec<VertexAttribute>, material_outputs: MaterialOutputs) -> Self {
        Self {
            vertex_input_layout,
            material_outputs,
            geo_shader: GeoShaderData::default(),
        }
    }

    /// Attach a geometry stage
    pub fn with_geometry(mut self, geo_shader: GeoShaderData) -> Self {
        self.geo_shader = geo_shader;
        self
    }

    /// Look up a vertex attribute by name
    pub fn vertex_attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.vertex_input_layout.iter().find(|attribute| attribute.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names_are_unique_per_list() {
        let mut outputs = MaterialOutputs::default();
        outputs.add_vertex_output("Out", DataLine::scalar(1.0).unwrap()).unwrap();
        outputs.add_fragment_output("Out", DataLine::scalar(1.0).unwrap()).unwrap();

        let err = outputs.add_vertex_output("Out", DataLine::scalar(2.0).unwrap()).unwrap_err();
        assert!(matches!(err, MaterialError::DuplicateOutput { stage: "vertex", .. }));
        assert_eq!(outputs.roots().count(), 3);
    }

    #[test]
    fn test_geometry_validity() {
        let mut geo = GeoShaderData::default();
        assert!(!geo.is_valid());

        geo.body = "void main() {}".to_string();
        assert!(!geo.is_valid());

        geo.max_vertices = 3;
        assert!(geo.is_valid());
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(InputPrimitive::from_name("lines_adjacency"), Some(InputPrimitive::LinesAdjacency));
        assert_eq!(InputPrimitive::TrianglesAdjacency.vertex_count(), 6);
        assert_eq!(OutputPrimitive::from_name("line_strip"), Some(OutputPrimitive::LineStrip));
        assert!(OutputPrimitive::from_name("quads").is_none());
    }
}
