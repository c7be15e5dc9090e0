// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in context values a stage may consume.

use crate::config::GeneratorConfig;
use crate::uniform::{UniformInfo, UniformKind};

bitflags::bitflags! {
    /// Built-in values referenced by a stage's generated code.
    ///
    /// Derived from the nodes reachable from a stage's roots; the geometry
    /// stage is the only place flags are authored directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialUsageFlags: u32 {
        /// Seconds since startup
        const ELAPSED_TIME = 1 << 0;
        /// Camera position in world space
        const CAMERA_POSITION = 1 << 1;
        /// Camera forward vector
        const CAMERA_FORWARD = 1 << 2;
        /// Camera up vector
        const CAMERA_UP = 1 << 3;
        /// Camera side vector
        const CAMERA_SIDE = 1 << 4;
        /// Viewport width
        const PROJECTION_WIDTH = 1 << 5;
        /// Viewport height
        const PROJECTION_HEIGHT = 1 << 6;
        /// Near clip distance
        const PROJECTION_NEAR = 1 << 7;
        /// Far clip distance
        const PROJECTION_FAR = 1 << 8;
        /// Vertical field of view
        const PROJECTION_FOV = 1 << 9;
        /// Orthographic bounds minimum
        const ORTHO_MIN = 1 << 10;
        /// Orthographic bounds maximum
        const ORTHO_MAX = 1 << 11;
        /// Object-to-world matrix
        const WORLD_MATRIX = 1 << 12;
        /// World-to-view matrix
        const VIEW_MATRIX = 1 << 13;
        /// View-to-clip matrix
        const PROJECTION_MATRIX = 1 << 14;
        /// Combined world-view-projection matrix
        const WVP_MATRIX = 1 << 15;
    }
}

impl Default for MaterialUsageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Declaration attached to one usage flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltInUniform {
    /// Flag gating the declaration
    pub flag: MaterialUsageFlags,
    /// Name without the configured prefix
    pub base_name: &'static str,
    /// Uniform kind
    pub kind: UniformKind,
    /// Component count
    pub size: usize,
}

const fn builtin(
    flag: MaterialUsageFlags,
    base_name: &'static str,
    kind: UniformKind,
    size: usize,
) -> BuiltInUniform {
    BuiltInUniform {
        flag,
        base_name,
        kind,
        size,
    }
}

/// Built-in uniforms in header order
pub const BUILTIN_UNIFORMS: &[BuiltInUniform] = &[
    builtin(MaterialUsageFlags::ELAPSED_TIME, "elapsedTime", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::CAMERA_POSITION, "camPos", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::CAMERA_FORWARD, "camForward", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::CAMERA_UP, "camUp", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::CAMERA_SIDE, "camSide", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::PROJECTION_WIDTH, "camWidth", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::PROJECTION_HEIGHT, "camHeight", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::PROJECTION_NEAR, "camZNear", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::PROJECTION_FAR, "camZFar", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::PROJECTION_FOV, "camFov", UniformKind::Float, 1),
    builtin(MaterialUsageFlags::ORTHO_MIN, "camOrthoMin", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::ORTHO_MAX, "camOrthoMax", UniformKind::Float, 3),
    builtin(MaterialUsageFlags::WORLD_MATRIX, "worldMatrix", UniformKind::Matrix4, 16),
    builtin(MaterialUsageFlags::VIEW_MATRIX, "viewMatrix", UniformKind::Matrix4, 16),
    builtin(MaterialUsageFlags::PROJECTION_MATRIX, "projMatrix", UniformKind::Matrix4, 16),
    builtin(MaterialUsageFlags::WVP_MATRIX, "wvpMatrix", UniformKind::Matrix4, 16),
];

impl MaterialUsageFlags {
    /// Declaration for a single flag
    pub fn builtin(self) -> Option<&'static BuiltInUniform> {
        BUILTIN_UNIFORMS.iter().find(|entry| entry.flag == self)
    }

    /// Uniforms gated by these flags, in header order
    pub fn builtin_uniforms(self, config: &GeneratorConfig) -> Vec<UniformInfo> {
        BUILTIN_UNIFORMS
            .iter()
            .filter(|entry| self.contains(entry.flag))
            .map(|entry| UniformInfo {
                name: config.builtin_name(entry.base_name),
                kind: entry.kind,
                size: entry.size,
                is_built_in: true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_flag_has_a_declaration() {
        for flag in MaterialUsageFlags::all().iter() {
            assert!(flag.builtin().is_some(), "{flag:?}");
        }
    }

    #[test]
    fn test_builtin_uniforms_follow_header_order() {
        let flags = MaterialUsageFlags::WVP_MATRIX | MaterialUsageFlags::ELAPSED_TIME;
        let uniforms = flags.builtin_uniforms(&GeneratorConfig::default());
        let names: Vec<_> = uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["u_elapsedTime", "u_wvpMatrix"]);
        assert!(uniforms.iter().all(|u| u.is_built_in));
        assert_eq!(uniforms[1].kind, UniformKind::Matrix4);
    }
}
