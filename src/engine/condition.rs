//! IF condition evaluation

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::parser::{Comparator, Condition, Operand};

/// Evaluate a condition against the current scope.
///
/// Variable operands must be defined; literal operands are interpolated.
/// Comparison is exact string (in)equality.
pub fn evaluate(condition: &Condition, env: &Environment<'_>) -> Result<bool, RuntimeError> {
    let left = resolve_operand(&condition.left, env)?;
    let right = resolve_operand(&condition.right, env)?;

    Ok(match condition.comparator {
        Comparator::Equal => left == right,
        Comparator::NotEqual => left != right,
    })
}

fn resolve_operand(operand: &Operand, env: &Environment<'_>) -> Result<String, RuntimeError> {
    match operand {
        Operand::Variable(name) => env.get(name).map(str::to_string),
        Operand::Literal(text) => env.interpolate(text),
    }
}
