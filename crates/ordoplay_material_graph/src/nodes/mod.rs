// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard node kinds.
//!
//! Each kind is a leaf: it declares its output sizes, checks its own
//! inputs, and emits one statement. Correctness of the emitted expression
//! is the kind's own responsibility.

pub mod inputs;
pub mod lighting;
pub mod math;
pub mod vector;

pub use inputs::{BuiltInValue, FragmentInput, Parameter, TextureSample, VertexInput};
pub use lighting::{DiffuseLighting, Fresnel, MatrixKind, SpecularLighting, TransformPoint};
pub use math::{
    Arithmetic, ArithmeticOp, BinaryFunction, BinaryFunctionKind, Clamp, Lerp, Step,
    UnaryFunction, UnaryFunctionKind,
};
pub use vector::{Combine, Cross, Dot, Length, Normalize, Split, Swizzle};

use crate::context::NodeScope;
use crate::error::{MaterialError, Result};
use crate::persist::DataReader;

/// Fail unless input `index` has exactly `size` components
pub(crate) fn expect_size(
    scope: &NodeScope<'_>,
    index: usize,
    label: &str,
    size: usize,
) -> Result<(), String> {
    let actual = scope.input_size(index);
    if actual == size {
        Ok(())
    } else {
        Err(format!("{label} must be size {size}, found size {actual}"))
    }
}

/// Fail unless input `index` is a scalar or matches input `value`
pub(crate) fn expect_scalar_or_match(
    scope: &NodeScope<'_>,
    index: usize,
    label: &str,
    value: usize,
) -> Result<(), String> {
    let size = scope.input_size(index);
    if size == 1 || size == scope.input_size(value) {
        Ok(())
    } else {
        Err(format!("{label} must be size 1 or match value size"))
    }
}

/// Fail unless two inputs have the same size or either is a scalar
pub(crate) fn expect_compatible(scope: &NodeScope<'_>, a: usize, b: usize) -> Result<(), String> {
    let (left, right) = (scope.input_size(a), scope.input_size(b));
    if left == right || left == 1 || right == 1 {
        Ok(())
    } else {
        Err(format!(
            "operands must be the same size or size 1, found sizes {left} and {right}"
        ))
    }
}

/// Read a component count field and check its range
pub(crate) fn read_size(reader: &mut dyn DataReader, name: &str) -> Result<usize> {
    let size = reader.read_uint(name)? as usize;
    if (1..=4).contains(&size) {
        Ok(size)
    } else {
        Err(MaterialError::Io(format!("'{name}' must be between 1 and 4, found {size}")))
    }
}
