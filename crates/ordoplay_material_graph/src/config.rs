// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code generator settings.

use serde::{Deserialize, Serialize};

/// Default GLSL version line
pub const DEFAULT_GLSL_VERSION: &str = "330 core";

/// Default prefix of built-in uniform names
pub const DEFAULT_BUILTIN_PREFIX: &str = "u_";

/// Settings that shape generated source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Text after `#version`
    pub glsl_version: String,
    /// Emits `precision <value> float;` after the version line when set
    pub float_precision: Option<String>,
    /// Prefix of built-in uniform names
    pub builtin_prefix: String,
}

impl GeneratorConfig {
    /// Full name of a built-in uniform
    pub fn builtin_name(&self, base_name: &str) -> String {
        format!("{}{}", self.builtin_prefix, base_name)
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            glsl_version: DEFAULT_GLSL_VERSION.to_string(),
            float_precision: None,
            builtin_prefix: DEFAULT_BUILTIN_PREFIX.to_string(),
        }
    }
}
