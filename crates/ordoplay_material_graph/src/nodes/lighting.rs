// SPDX-License-Identifier: MIT OR Apache-2.0
//! Space transforms and lighting terms.

use super::expect_size;
use crate::context::NodeScope;
use crate::error::{MaterialError, Result};
use crate::node::ShaderNode;
use crate::persist::{DataReader, DataWriter};
use crate::usage::MaterialUsageFlags;

const BLINN_PHONG: &str = "\
float ordo_blinnPhong(vec3 normal, vec3 lightDir, vec3 position, vec3 camPos, float shininess) {
    vec3 viewDir = normalize(camPos - position);
    vec3 halfDir = normalize(normalize(lightDir) + viewDir);
    return pow(max(dot(normalize(normal), halfDir), 0.0), shininess);
}
";

const FRESNEL: &str = "\
float ordo_fresnel(vec3 normal, vec3 position, vec3 camPos, float power) {
    vec3 viewDir = normalize(camPos - position);
    return pow(1.0 - max(dot(normalize(normal), viewDir), 0.0), power);
}
";

/// Built-in matrix a [`TransformPoint`] multiplies by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// Object to world
    World,
    /// World to view
    View,
    /// View to clip
    Projection,
    /// Object to clip
    WorldViewProjection,
}

impl MatrixKind {
    const ALL: [MatrixKind; 4] = [
        Self::World,
        Self::View,
        Self::Projection,
        Self::WorldViewProjection,
    ];

    /// Persisted name
    pub fn name(self) -> &'static str {
        match self {
            Self::World => "world",
            Self::View => "view",
            Self::Projection => "projection",
            Self::WorldViewProjection => "world_view_projection",
        }
    }

    /// Usage flag gating the matrix uniform
    pub fn flag(self) -> MaterialUsageFlags {
        match self {
            Self::World => MaterialUsageFlags::WORLD_MATRIX,
            Self::View => MaterialUsageFlags::VIEW_MATRIX,
            Self::Projection => MaterialUsageFlags::PROJECTION_MATRIX,
            Self::WorldViewProjection => MaterialUsageFlags::WVP_MATRIX,
        }
    }

    fn base_name(self) -> &'static str {
        self.flag()
            .builtin()
            .map_or("worldMatrix", |uniform| uniform.base_name)
    }
}

/// `matrix * vec4(point, 1.0)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPoint {
    /// Matrix applied
    pub matrix: MatrixKind,
}

impl TransformPoint {
    /// Transform by `matrix`
    pub fn new(matrix: MatrixKind) -> Self {
        Self { matrix }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let name = reader.read_string("matrix")?;
        MatrixKind::ALL
            .into_iter()
            .find(|matrix| matrix.name() == name)
            .map(Self::new)
            .ok_or_else(|| MaterialError::Io(format!("unknown matrix '{name}'")))
    }
}

impl ShaderNode for TransformPoint {
    fn type_name(&self) -> &'static str {
        "TransformPoint"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        4
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        match scope.input_size(0) {
            3 | 4 => Ok(()),
            size => Err(format!("point must be size 3 or 4, found size {size}")),
        }
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        let point = if scope.input_size(0) == 3 {
            format!("vec4({}, 1.0)", scope.input_expr(0))
        } else {
            scope.input_expr(0).to_string()
        };
        let matrix = scope.builtin(self.matrix.base_name());
        scope.declare(out, 0, format!("{matrix} * {point}"));
        Ok(())
    }

    fn usage_flags(&self) -> MaterialUsageFlags {
        self.matrix.flag()
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("matrix", self.matrix.name())
    }
}

/// Lambert term `max(dot(n, l), 0)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffuseLighting;

impl ShaderNode for DiffuseLighting {
    fn type_name(&self) -> &'static str {
        "DiffuseLighting"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_size(scope, 0, "normal", 3)?;
        expect_size(scope, 1, "light direction", 3)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!(
                "max(dot(normalize({}), normalize({})), 0.0)",
                scope.input_expr(0),
                scope.input_expr(1)
            ),
        );
        Ok(())
    }
}

/// Blinn-Phong specular term seen from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecularLighting;

impl ShaderNode for SpecularLighting {
    fn type_name(&self) -> &'static str {
        "SpecularLighting"
    }

    fn input_count(&self) -> usize {
        4
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_size(scope, 0, "normal", 3)?;
        expect_size(scope, 1, "light direction", 3)?;
        expect_size(scope, 2, "surface position", 3)?;
        expect_size(scope, 3, "shininess", 1)
    }

    fn declared_helper_functions(&self) -> Vec<&'static str> {
        vec![BLINN_PHONG]
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!(
                "ordo_blinnPhong({}, {}, {}, {}, {})",
                scope.input_expr(0),
                scope.input_expr(1),
                scope.input_expr(2),
                scope.builtin("camPos"),
                scope.input_expr(3)
            ),
        );
        Ok(())
    }

    fn usage_flags(&self) -> MaterialUsageFlags {
        MaterialUsageFlags::CAMERA_POSITION
    }
}

/// Rim term `pow(1 - dot(n, v), power)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fresnel;

impl ShaderNode for Fresnel {
    fn type_name(&self) -> &'static str {
        "Fresnel"
    }

    fn input_count(&self) -> usize {
        3
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_size(scope, 0, "normal", 3)?;
        expect_size(scope, 1, "surface position", 3)?;
        expect_size(scope, 2, "power", 1)
    }

    fn declared_helper_functions(&self) -> Vec<&'static str> {
        vec![FRESNEL]
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!(
                "ordo_fresnel({}, {}, {}, {})",
                scope.input_expr(0),
                scope.input_expr(1),
                scope.builtin("camPos"),
                scope.input_expr(2)
            ),
        );
        Ok(())
    }

    fn usage_flags(&self) -> MaterialUsageFlags {
        MaterialUsageFlags::CAMERA_POSITION
    }
}
