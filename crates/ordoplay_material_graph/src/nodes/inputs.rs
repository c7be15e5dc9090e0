// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input nodes: built-ins, parameters, vertex attributes, varyings, textures.

use super::{expect_size, read_size};
use crate::config::GeneratorConfig;
use crate::context::{NodeScope, ShaderStage};
use crate::error::Result;
use crate::node::ShaderNode;
use crate::persist::{DataReader, DataWriter};
use crate::uniform::{UniformInfo, UniformKind};
use crate::usage::MaterialUsageFlags;

/// Values the engine supplies; each has exactly one node per graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltInValue {
    /// Window-space coordinate of the current fragment
    FragmentCoordinate,
    /// Seconds since start
    ElapsedTime,
    /// Camera position in world space
    CameraPosition,
    /// Camera forward vector
    CameraForward,
    /// Camera up vector
    CameraUp,
    /// Camera side vector
    CameraSide,
    /// Viewport width
    ProjectionWidth,
    /// Viewport height
    ProjectionHeight,
    /// Near clip distance
    ProjectionNear,
    /// Far clip distance
    ProjectionFar,
    /// Vertical field of view
    ProjectionFov,
    /// Orthographic bounds minimum
    OrthoMin,
    /// Orthographic bounds maximum
    OrthoMax,
}

impl BuiltInValue {
    /// Every built-in value
    pub const ALL: [BuiltInValue; 13] = [
        Self::FragmentCoordinate,
        Self::ElapsedTime,
        Self::CameraPosition,
        Self::CameraForward,
        Self::CameraUp,
        Self::CameraSide,
        Self::ProjectionWidth,
        Self::ProjectionHeight,
        Self::ProjectionNear,
        Self::ProjectionFar,
        Self::ProjectionFov,
        Self::OrthoMin,
        Self::OrthoMax,
    ];

    /// Type name; also the name of the singleton node
    pub fn type_name(self) -> &'static str {
        match self {
            Self::FragmentCoordinate => "FragmentCoordinate",
            Self::ElapsedTime => "ElapsedTime",
            Self::CameraPosition => "CameraPosition",
            Self::CameraForward => "CameraForward",
            Self::CameraUp => "CameraUp",
            Self::CameraSide => "CameraSide",
            Self::ProjectionWidth => "ProjectionWidth",
            Self::ProjectionHeight => "ProjectionHeight",
            Self::ProjectionNear => "ProjectionNear",
            Self::ProjectionFar => "ProjectionFar",
            Self::ProjectionFov => "ProjectionFov",
            Self::OrthoMin => "OrthoMin",
            Self::OrthoMax => "OrthoMax",
        }
    }

    /// Look up a value by type name
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|value| value.type_name() == name)
    }

    /// Usage flag gating this value's uniform
    pub fn flag(self) -> MaterialUsageFlags {
        match self {
            Self::FragmentCoordinate => MaterialUsageFlags::empty(),
            Self::ElapsedTime => MaterialUsageFlags::ELAPSED_TIME,
            Self::CameraPosition => MaterialUsageFlags::CAMERA_POSITION,
            Self::CameraForward => MaterialUsageFlags::CAMERA_FORWARD,
            Self::CameraUp => MaterialUsageFlags::CAMERA_UP,
            Self::CameraSide => MaterialUsageFlags::CAMERA_SIDE,
            Self::ProjectionWidth => MaterialUsageFlags::PROJECTION_WIDTH,
            Self::ProjectionHeight => MaterialUsageFlags::PROJECTION_HEIGHT,
            Self::ProjectionNear => MaterialUsageFlags::PROJECTION_NEAR,
            Self::ProjectionFar => MaterialUsageFlags::PROJECTION_FAR,
            Self::ProjectionFov => MaterialUsageFlags::PROJECTION_FOV,
            Self::OrthoMin => MaterialUsageFlags::ORTHO_MIN,
            Self::OrthoMax => MaterialUsageFlags::ORTHO_MAX,
        }
    }

    /// Component count
    pub fn size(self) -> usize {
        match self {
            Self::FragmentCoordinate => 4,
            _ => self.flag().builtin().map_or(1, |uniform| uniform.size),
        }
    }

    /// Whether generated code for `stage` may read this value
    pub fn available_in(self, stage: ShaderStage) -> bool {
        match self {
            Self::FragmentCoordinate => stage == ShaderStage::Fragment,
            _ => true,
        }
    }
}

impl ShaderNode for BuiltInValue {
    fn type_name(&self) -> &'static str {
        BuiltInValue::type_name(*self)
    }

    fn input_count(&self) -> usize {
        0
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        self.size()
    }

    fn output_name(&self, _node_name: &str, _index: usize, config: &GeneratorConfig) -> String {
        match self.flag().builtin() {
            Some(uniform) => config.builtin_name(uniform.base_name),
            None => "gl_FragCoord".to_string(),
        }
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        if self.available_in(scope.stage()) {
            Ok(())
        } else {
            Err(format!(
                "{} is not available in the {} stage",
                BuiltInValue::type_name(*self),
                scope.stage().name()
            ))
        }
    }

    fn emit_statement(&self, _scope: &NodeScope<'_>, _out: &mut String) -> Result<(), String> {
        Ok(())
    }

    fn usage_flags(&self) -> MaterialUsageFlags {
        self.flag()
    }

    fn is_singleton(&self) -> bool {
        true
    }
}

/// Custom uniform named after the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Component count
    pub size: usize,
}

impl Parameter {
    /// Create a parameter of `size` components
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        Ok(Self::new(read_size(reader, "size")?))
    }
}

impl ShaderNode for Parameter {
    fn type_name(&self) -> &'static str {
        "Parameter"
    }

    fn input_count(&self) -> usize {
        0
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        self.size
    }

    fn validate_inputs(&self, _scope: &NodeScope<'_>) -> Result<(), String> {
        if (1..=4).contains(&self.size) {
            Ok(())
        } else {
            Err(format!("parameter size must be between 1 and 4, found {}", self.size))
        }
    }

    fn declared_uniforms(&self, scope: &NodeScope<'_>) -> Vec<UniformInfo> {
        vec![UniformInfo::custom(scope.name(), UniformKind::Float, self.size)]
    }

    fn emit_statement(&self, _scope: &NodeScope<'_>, _out: &mut String) -> Result<(), String> {
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_uint("size", self.size as u32)
    }
}

/// Reads a vertex attribute from the input layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    /// Attribute name
    pub attribute: String,
    /// Component count
    pub size: usize,
}

impl VertexInput {
    /// Read `attribute` with `size` components
    pub fn new(attribute: impl Into<String>, size: usize) -> Self {
        Self {
            attribute: attribute.into(),
            size,
        }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let attribute = reader.read_string("attribute")?;
        Ok(Self::new(attribute, read_size(reader, "size")?))
    }
}

impl ShaderNode for VertexInput {
    fn type_name(&self) -> &'static str {
        "VertexInput"
    }

    fn input_count(&self) -> usize {
        0
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        self.size
    }

    fn output_name(&self, _node_name: &str, _index: usize, _config: &GeneratorConfig) -> String {
        self.attribute.clone()
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        if scope.stage() != ShaderStage::Vertex {
            return Err(format!(
                "vertex input '{}' cannot be read in the {} stage",
                self.attribute,
                scope.stage().name()
            ));
        }
        match scope.material().vertex_attribute(&self.attribute) {
            None => Err(format!(
                "vertex input '{}' is not part of the vertex input layout",
                self.attribute
            )),
            Some(attribute) if attribute.size != self.size => Err(format!(
                "vertex input '{}' is size {} in the layout, not {}",
                self.attribute, attribute.size, self.size
            )),
            Some(_) => Ok(()),
        }
    }

    fn emit_statement(&self, _scope: &NodeScope<'_>, _out: &mut String) -> Result<(), String> {
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("attribute", &self.attribute)?;
        writer.write_uint("size", self.size as u32)
    }
}

/// Reads an interpolated value in the fragment stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInput {
    /// Vertex output (or geometry output attribute) name
    pub varying: String,
    /// Component count
    pub size: usize,
}

impl FragmentInput {
    /// Read `varying` with `size` components
    pub fn new(varying: impl Into<String>, size: usize) -> Self {
        Self {
            varying: varying.into(),
            size,
        }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let varying = reader.read_string("varying")?;
        Ok(Self::new(varying, read_size(reader, "size")?))
    }
}

impl ShaderNode for FragmentInput {
    fn type_name(&self) -> &'static str {
        "FragmentInput"
    }

    fn input_count(&self) -> usize {
        0
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        self.size
    }

    fn output_name(&self, _node_name: &str, _index: usize, _config: &GeneratorConfig) -> String {
        self.varying.clone()
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        if scope.stage() != ShaderStage::Fragment {
            return Err(format!(
                "fragment input '{}' cannot be read in the {} stage",
                self.varying,
                scope.stage().name()
            ));
        }
        match scope.varyings().iter().find(|(name, _)| *name == self.varying) {
            None => Err(format!("'{}' is not an output of the previous stage", self.varying)),
            Some((_, size)) if *size != self.size => Err(format!(
                "'{}' is size {} in the previous stage, not {}",
                self.varying, size, self.size
            )),
            Some(_) => Ok(()),
        }
    }

    fn emit_statement(&self, _scope: &NodeScope<'_>, _out: &mut String) -> Result<(), String> {
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("varying", &self.varying)?;
        writer.write_uint("size", self.size as u32)
    }
}

/// Samples a 2D texture at a UV coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSample {
    /// Sampler uniform name
    pub sampler: String,
}

impl TextureSample {
    /// Sample through the uniform `sampler`
    pub fn new(sampler: impl Into<String>) -> Self {
        Self {
            sampler: sampler.into(),
        }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        Ok(Self::new(reader.read_string("sampler")?))
    }
}

impl ShaderNode for TextureSample {
    fn type_name(&self) -> &'static str {
        "TextureSample"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        4
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        if !crate::graph::is_identifier(&self.sampler) {
            return Err(format!("invalid sampler name '{}'", self.sampler));
        }
        expect_size(scope, 0, "uv", 2)
    }

    fn declared_uniforms(&self, _scope: &NodeScope<'_>) -> Vec<UniformInfo> {
        vec![UniformInfo::custom(&self.sampler, UniformKind::Sampler2D, 1)]
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, format!("texture({}, {})", self.sampler, scope.input_expr(0)));
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("sampler", &self.sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_follow_config() {
        let config = GeneratorConfig {
            builtin_prefix: "ordo_".to_string(),
            ..GeneratorConfig::default()
        };
        assert_eq!(BuiltInValue::CameraPosition.output_name("CameraPosition", 0, &config), "ordo_camPos");
        assert_eq!(BuiltInValue::FragmentCoordinate.output_name("FragmentCoordinate", 0, &config), "gl_FragCoord");
        assert_eq!(BuiltInValue::CameraPosition.size(), 3);
        assert_eq!(BuiltInValue::ElapsedTime.size(), 1);
    }

    #[test]
    fn test_builtin_type_names_round_trip() {
        for value in BuiltInValue::ALL {
            assert_eq!(BuiltInValue::from_type_name(value.type_name()), Some(value));
        }
        assert!(!BuiltInValue::FragmentCoordinate.available_in(ShaderStage::Vertex));
    }
}
