// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uniform descriptors handed to the link layer.

use crate::data_line::glsl_type;
use serde::{Deserialize, Serialize};

/// Kind of value a uniform holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformKind {
    /// Float vector of `size` components
    Float,
    /// 4x4 float matrix
    Matrix4,
    /// 2D texture sampler
    Sampler2D,
}

impl UniformKind {
    /// Persisted name
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Matrix4 => "mat4",
            Self::Sampler2D => "sampler2D",
        }
    }

    /// Parse a persisted name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Float),
            "mat4" => Some(Self::Matrix4),
            "sampler2D" => Some(Self::Sampler2D),
            _ => None,
        }
    }
}

/// A uniform referenced by generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformInfo {
    /// Identifier in generated code
    pub name: String,
    /// Value kind
    pub kind: UniformKind,
    /// Component count (16 for matrices, 1 for samplers)
    pub size: usize,
    /// Whether the engine supplies this value itself
    pub is_built_in: bool,
}

impl UniformInfo {
    /// A uniform supplied by the material author
    pub fn custom(name: impl Into<String>, kind: UniformKind, size: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            is_built_in: false,
        }
    }

    /// GLSL type of the declaration
    pub fn glsl_type(&self) -> &'static str {
        match self.kind {
            UniformKind::Float => glsl_type(self.size),
            UniformKind::Matrix4 => "mat4",
            UniformKind::Sampler2D => "sampler2D",
        }
    }

    /// Whether `size` fits the kind: 1 to 4 for floats, 16 for matrices, 1 for samplers
    pub fn has_valid_size(&self) -> bool {
        match self.kind {
            UniformKind::Float => (1..=4).contains(&self.size),
            UniformKind::Matrix4 => self.size == 16,
            UniformKind::Sampler2D => self.size == 1,
        }
    }

    /// `uniform <type> <name>;`
    pub fn declaration(&self) -> String {
        format!("uniform {} {};", self.glsl_type(), self.name)
    }
}

/// Append `uniforms` to `list`, skipping names already present
pub fn merge_uniforms(list: &mut Vec<UniformInfo>, uniforms: impl IntoIterator<Item = UniformInfo>) {
    for uniform in uniforms {
        if !list.iter().any(|existing| existing.name == uniform.name) {
            list.push(uniform);
        }
    }
}
