// SPDX-License-Identifier: MIT OR Apache-2.0
//! Vector nodes: products, swizzles, packing and unpacking.

use super::{expect_size, read_size};
use crate::config::GeneratorConfig;
use crate::context::NodeScope;
use crate::data_line::{glsl_type, MAX_COMPONENTS};
use crate::error::{MaterialError, Result};
use crate::graph::GraphError;
use crate::node::ShaderNode;
use crate::persist::{DataReader, DataWriter};

const COMPONENTS: [char; MAX_COMPONENTS] = ['x', 'y', 'z', 'w'];

/// `dot(a, b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dot;

impl ShaderNode for Dot {
    fn type_name(&self) -> &'static str {
        "Dot"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        let (a, b) = (scope.input_size(0), scope.input_size(1));
        if a == b {
            Ok(())
        } else {
            Err(format!("dot operands must be the same size, found sizes {a} and {b}"))
        }
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, format!("dot({}, {})", scope.input_expr(0), scope.input_expr(1)));
        Ok(())
    }
}

/// `cross(a, b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cross;

impl ShaderNode for Cross {
    fn type_name(&self) -> &'static str {
        "Cross"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        3
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_size(scope, 0, "first cross product operand", 3)?;
        expect_size(scope, 1, "second cross product operand", 3)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, format!("cross({}, {})", scope.input_expr(0), scope.input_expr(1)));
        Ok(())
    }
}

/// `normalize(x)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Normalize;

impl ShaderNode for Normalize {
    fn type_name(&self) -> &'static str {
        "Normalize"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0]
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, format!("normalize({})", scope.input_expr(0)));
        Ok(())
    }
}

/// `length(x)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Length;

impl ShaderNode for Length {
    fn type_name(&self) -> &'static str {
        "Length"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, format!("length({})", scope.input_expr(0)));
        Ok(())
    }
}

/// Selects and reorders components, e.g. `zyx`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swizzle {
    components: Vec<usize>,
}

impl Swizzle {
    /// Parse an `xyzw` or `rgba` pattern of one to four components
    pub fn new(pattern: &str) -> Result<Self, GraphError> {
        let components = pattern
            .chars()
            .map(|c| match c {
                'x' | 'r' => Some(0),
                'y' | 'g' => Some(1),
                'z' | 'b' => Some(2),
                'w' | 'a' => Some(3),
                _ => None,
            })
            .collect::<Option<Vec<usize>>>()
            .filter(|components| (1..=MAX_COMPONENTS).contains(&components.len()))
            .ok_or_else(|| GraphError::InvalidSwizzle(pattern.to_string()))?;
        Ok(Self { components })
    }

    /// Component indices
    pub fn components(&self) -> &[usize] {
        &self.components
    }

    /// Pattern in `xyzw` form
    pub fn pattern(&self) -> String {
        self.components.iter().map(|c| COMPONENTS[*c]).collect()
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let pattern = reader.read_string("pattern")?;
        Self::new(&pattern).map_err(MaterialError::from)
    }
}

impl ShaderNode for Swizzle {
    fn type_name(&self) -> &'static str {
        "Swizzle"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        self.components.len()
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        let size = scope.input_size(0);
        match self.components.iter().find(|c| **c >= size) {
            Some(c) => Err(format!(
                "swizzle component '{}' is out of range for a size {size} input",
                COMPONENTS[*c]
            )),
            None => Ok(()),
        }
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        // Scalars have no components to select; widen instead.
        let expr = if scope.input_size(0) == 1 {
            scope.input_broadcast(0, self.components.len())
        } else {
            format!("({}).{}", scope.input_expr(0), self.pattern())
        };
        scope.declare(out, 0, expr);
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("pattern", &self.pattern())
    }
}

/// Concatenates two to four inputs into one vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combine {
    count: usize,
}

impl Combine {
    /// Combine `count` inputs
    pub fn new(count: usize) -> Result<Self, GraphError> {
        if (2..=MAX_COMPONENTS).contains(&count) {
            Ok(Self { count })
        } else {
            Err(GraphError::InputCount {
                type_name: "Combine",
                min: 2,
                max: MAX_COMPONENTS,
                actual: count,
            })
        }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let count = reader.read_uint("count")? as usize;
        Self::new(count).map_err(MaterialError::from)
    }
}

impl ShaderNode for Combine {
    fn type_name(&self) -> &'static str {
        "Combine"
    }

    fn input_count(&self) -> usize {
        self.count
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes.iter().sum::<usize>().min(MAX_COMPONENTS)
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        let total: usize = (0..self.count).map(|i| scope.input_size(i)).sum();
        if total <= MAX_COMPONENTS {
            Ok(())
        } else {
            Err(format!("combined size must not exceed 4, found {total}"))
        }
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        let parts: Vec<&str> = (0..self.count).map(|i| scope.input_expr(i)).collect();
        scope.declare(
            out,
            0,
            format!("{}({})", glsl_type(scope.output_size(0)), parts.join(", ")),
        );
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_uint("count", self.count as u32)
    }
}

/// Splits a vector into one scalar output per component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    size: usize,
}

impl Split {
    /// Split a vector of `size` components
    pub fn new(size: usize) -> Self {
        Self {
            size: size.clamp(1, MAX_COMPONENTS),
        }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        Ok(Self::new(read_size(reader, "size")?))
    }
}

impl ShaderNode for Split {
    fn type_name(&self) -> &'static str {
        "Split"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_count(&self) -> usize {
        self.size
    }

    fn output_size(&self, _index: usize, _input_sizes: &[usize]) -> usize {
        1
    }

    fn output_name(&self, node_name: &str, index: usize, _config: &GeneratorConfig) -> String {
        format!("{node_name}_{}", COMPONENTS[index.min(MAX_COMPONENTS - 1)])
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_size(scope, 0, "split input", self.size)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        for index in 0..self.size {
            let expr = if self.size == 1 {
                scope.input_expr(0).to_string()
            } else {
                format!("({}).{}", scope.input_expr(0), COMPONENTS[index])
            };
            scope.declare(out, index, expr);
        }
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_uint("size", self.size as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swizzle_patterns() {
        assert_eq!(Swizzle::new("rgb").unwrap().pattern(), "xyz");
        assert_eq!(Swizzle::new("wzyx").unwrap().components(), &[3, 2, 1, 0]);
        assert!(Swizzle::new("").is_err());
        assert!(Swizzle::new("xyzwx").is_err());
        assert!(Swizzle::new("xq").is_err());
    }

    #[test]
    fn test_combine_input_range() {
        assert!(Combine::new(1).is_err());
        assert_eq!(Combine::new(3).unwrap().input_count(), 3);
        assert!(Combine::new(5).is_err());
    }

    #[test]
    fn test_split_output_names() {
        let split = Split::new(3);
        let config = GeneratorConfig::default();
        assert_eq!(split.output_count(), 3);
        assert_eq!(split.output_name("n", 2, &config), "n_z");
    }
}
