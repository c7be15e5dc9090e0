// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component-wise math nodes.

use super::{expect_compatible, expect_scalar_or_match};
use crate::context::NodeScope;
use crate::error::{MaterialError, Result};
use crate::node::ShaderNode;
use crate::persist::{DataReader, DataWriter};

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`
    Multiply,
    /// `a / b`
    Divide,
}

impl ArithmeticOp {
    const ALL: [ArithmeticOp; 4] = [Self::Add, Self::Subtract, Self::Multiply, Self::Divide];

    /// Persisted name
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
        }
    }

    /// GLSL operator
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// `a <op> b`, where either side may be a scalar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arithmetic {
    /// Operator
    pub op: ArithmeticOp,
}

impl Arithmetic {
    /// Create an arithmetic node
    pub fn new(op: ArithmeticOp) -> Self {
        Self { op }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let name = reader.read_string("op")?;
        ArithmeticOp::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .map(Self::new)
            .ok_or_else(|| MaterialError::Io(format!("unknown arithmetic operator '{name}'")))
    }
}

impl ShaderNode for Arithmetic {
    fn type_name(&self) -> &'static str {
        "Arithmetic"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0].max(input_sizes[1])
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_compatible(scope, 0, 1)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!("{} {} {}", scope.input_expr(0), self.op.symbol(), scope.input_expr(1)),
        );
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("op", self.op.name())
    }
}

/// One-argument component-wise function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryFunctionKind {
    /// `sin(x)`
    Sin,
    /// `cos(x)`
    Cos,
    /// `tan(x)`
    Tan,
    /// `abs(x)`
    Abs,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `fract(x)`
    Fract,
    /// `sqrt(x)`
    Sqrt,
    /// `exp(x)`
    Exp,
    /// `log(x)`
    Log,
    /// `sign(x)`
    Sign,
    /// `-x`
    Negate,
    /// `1 - x`
    OneMinus,
    /// `clamp(x, 0, 1)`
    Saturate,
}

impl UnaryFunctionKind {
    const ALL: [UnaryFunctionKind; 14] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Abs,
        Self::Floor,
        Self::Ceil,
        Self::Fract,
        Self::Sqrt,
        Self::Exp,
        Self::Log,
        Self::Sign,
        Self::Negate,
        Self::OneMinus,
        Self::Saturate,
    ];

    /// Persisted name
    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Fract => "fract",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sign => "sign",
            Self::Negate => "negate",
            Self::OneMinus => "one_minus",
            Self::Saturate => "saturate",
        }
    }

    fn expression(self, x: &str) -> String {
        match self {
            Self::Negate => format!("-({x})"),
            Self::OneMinus => format!("1.0 - ({x})"),
            Self::Saturate => format!("clamp({x}, 0.0, 1.0)"),
            other => format!("{}({x})", other.name()),
        }
    }
}

/// Applies a [`UnaryFunctionKind`] to its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryFunction {
    /// Function applied
    pub function: UnaryFunctionKind,
}

impl UnaryFunction {
    /// Create a unary function node
    pub fn new(function: UnaryFunctionKind) -> Self {
        Self { function }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let name = reader.read_string("function")?;
        UnaryFunctionKind::ALL
            .into_iter()
            .find(|function| function.name() == name)
            .map(Self::new)
            .ok_or_else(|| MaterialError::Io(format!("unknown unary function '{name}'")))
    }
}

impl ShaderNode for UnaryFunction {
    fn type_name(&self) -> &'static str {
        "UnaryFunction"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0]
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(out, 0, self.function.expression(scope.input_expr(0)));
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("function", self.function.name())
    }
}

/// Two-argument component-wise function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFunctionKind {
    /// `pow(a, b)`
    Pow,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `mod(a, b)`
    Mod,
    /// `atan(a, b)`
    Atan2,
}

impl BinaryFunctionKind {
    const ALL: [BinaryFunctionKind; 5] = [Self::Pow, Self::Min, Self::Max, Self::Mod, Self::Atan2];

    /// Persisted name
    pub fn name(self) -> &'static str {
        match self {
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mod => "mod",
            Self::Atan2 => "atan2",
        }
    }

    fn glsl(self) -> &'static str {
        match self {
            Self::Atan2 => "atan",
            other => other.name(),
        }
    }
}

/// Applies a [`BinaryFunctionKind`]; a scalar operand is widened to the other's size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFunction {
    /// Function applied
    pub function: BinaryFunctionKind,
}

impl BinaryFunction {
    /// Create a binary function node
    pub fn new(function: BinaryFunctionKind) -> Self {
        Self { function }
    }

    /// Read persisted fields
    pub fn read_fields(reader: &mut dyn DataReader) -> Result<Self> {
        let name = reader.read_string("function")?;
        BinaryFunctionKind::ALL
            .into_iter()
            .find(|function| function.name() == name)
            .map(Self::new)
            .ok_or_else(|| MaterialError::Io(format!("unknown binary function '{name}'")))
    }
}

impl ShaderNode for BinaryFunction {
    fn type_name(&self) -> &'static str {
        "BinaryFunction"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0].max(input_sizes[1])
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_compatible(scope, 0, 1)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        let size = scope.output_size(0);
        scope.declare(
            out,
            0,
            format!(
                "{}({}, {})",
                self.function.glsl(),
                scope.input_broadcast(0, size),
                scope.input_broadcast(1, size)
            ),
        );
        Ok(())
    }

    fn write_fields(&self, writer: &mut dyn DataWriter) -> Result<()> {
        writer.write_string("function", self.function.name())
    }
}

/// `mix(a, b, t)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lerp;

impl ShaderNode for Lerp {
    fn type_name(&self) -> &'static str {
        "Lerp"
    }

    fn input_count(&self) -> usize {
        3
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0]
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        let (a, b) = (scope.input_size(0), scope.input_size(1));
        if a != b {
            return Err(format!("lerp endpoints must be the same size, found sizes {a} and {b}"));
        }
        expect_scalar_or_match(scope, 2, "lerp factor", 0)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!(
                "mix({}, {}, {})",
                scope.input_expr(0),
                scope.input_expr(1),
                scope.input_expr(2)
            ),
        );
        Ok(())
    }
}

/// `step(threshold, value)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Step;

impl ShaderNode for Step {
    fn type_name(&self) -> &'static str {
        "Step"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[1]
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_scalar_or_match(scope, 0, "threshold", 1)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!("step({}, {})", scope.input_expr(0), scope.input_expr(1)),
        );
        Ok(())
    }
}

/// `clamp(value, min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clamp;

impl ShaderNode for Clamp {
    fn type_name(&self) -> &'static str {
        "Clamp"
    }

    fn input_count(&self) -> usize {
        3
    }

    fn output_size(&self, _index: usize, input_sizes: &[usize]) -> usize {
        input_sizes[0]
    }

    fn validate_inputs(&self, scope: &NodeScope<'_>) -> Result<(), String> {
        expect_scalar_or_match(scope, 1, "min", 0)?;
        expect_scalar_or_match(scope, 2, "max", 0)
    }

    fn emit_statement(&self, scope: &NodeScope<'_>, out: &mut String) -> Result<(), String> {
        scope.declare(
            out,
            0,
            format!(
                "clamp({}, {}, {})",
                scope.input_expr(0),
                scope.input_expr(1),
                scope.input_expr(2)
            ),
        );
        Ok(())
    }
}
