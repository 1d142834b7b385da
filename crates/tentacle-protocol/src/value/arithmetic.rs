use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValueError;

/// Decimal places used when a property does not configure a precision.
pub const DEFAULT_PRECISION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticKind {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl fmt::Display for ArithmeticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArithmeticKind::Add => write!(f, "Add"),
            ArithmeticKind::Subtract => write!(f, "Subtract"),
            ArithmeticKind::Multiply => write!(f, "Multiply"),
            ArithmeticKind::Divide => write!(f, "Divide"),
        }
    }
}

/// One post-processing step; `value` is a float literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithmeticOperation {
    #[serde(rename = "type")]
    pub kind: ArithmeticKind,
    pub value: String,
}

impl ArithmeticOperation {
    pub fn new(kind: ArithmeticKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Apply `operations` to `raw` in declaration order and format the result.
///
/// Returns `None` when there is nothing to apply.
pub fn apply_operations(
    raw: f64,
    operations: &[ArithmeticOperation],
    precision: usize,
) -> Result<Option<String>, ValueError> {
    if operations.is_empty() {
        return Ok(None);
    }

    let mut result = raw;
    for operation in operations {
        let operand: f64 = operation.value.trim().parse().map_err(|_| ValueError::Operand {
            operation: operation.kind.to_string(),
            value: operation.value.clone(),
        })?;
        result = match operation.kind {
            ArithmeticKind::Add => result + operand,
            ArithmeticKind::Subtract => result - operand,
            ArithmeticKind::Multiply => result * operand,
            ArithmeticKind::Divide => result / operand,
        };
    }

    Ok(Some(format!("{result:.precision$}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_operations() {
        assert_eq!(apply_operations(42.0, &[], 2).unwrap(), None);
    }

    #[test]
    fn test_operations_apply_in_order() {
        // (raw - 32) / 1.8: fahrenheit to celsius
        let operations = vec![
            ArithmeticOperation::new(ArithmeticKind::Subtract, "32"),
            ArithmeticOperation::new(ArithmeticKind::Divide, "1.8"),
        ];
        assert_eq!(
            apply_operations(212.0, &operations, 1).unwrap().as_deref(),
            Some("100.0")
        );
    }

    #[test]
    fn test_default_precision() {
        let operations = vec![ArithmeticOperation::new(ArithmeticKind::Multiply, "0.1")];
        assert_eq!(
            apply_operations(235.0, &operations, DEFAULT_PRECISION)
                .unwrap()
                .as_deref(),
            Some("23.50")
        );
    }

    #[test]
    fn test_bad_operand() {
        let operations = vec![ArithmeticOperation::new(ArithmeticKind::Add, "ten")];
        assert!(matches!(
            apply_operations(1.0, &operations, 2),
            Err(ValueError::Operand { .. })
        ));
    }

    #[test]
    fn test_serde_shape() {
        let operation: ArithmeticOperation =
            serde_json::from_str(r#"{"type":"Divide","value":"10"}"#).unwrap();
        assert_eq!(operation.kind, ArithmeticKind::Divide);
    }
}
