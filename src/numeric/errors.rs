// ============================================================================
// Numeric Errors
// Error types for fixed-point arithmetic operations
// ============================================================================

use thiserror::Error;

/// Errors that can occur during fixed-point arithmetic and parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NumericError {
    #[error("arithmetic overflow: result exceeded maximum value")]
    Overflow,
    #[error("arithmetic underflow: result below minimum value")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
    /// More fractional digits than the target scale can hold
    #[error("precision loss: value has more decimal places than supported")]
    PrecisionLoss,
    #[error("invalid input: could not parse value")]
    InvalidInput,
}

/// Result type alias for numeric operations
pub type NumericResult<T> = Result<T, NumericError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            NumericError::Overflow.to_string(),
            "arithmetic overflow: result exceeded maximum value"
        );
        assert_eq!(NumericError::DivisionByZero.to_string(), "division by zero");
    }
}
