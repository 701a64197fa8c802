// ============================================================================
// Numeric Module
// Exact fixed-point arithmetic for prices and quantities
// ============================================================================
//
// Prices and quantities never touch floating point. `rust_decimal::Decimal`
// is accepted at API boundaries only and converted losslessly (or rejected).

mod errors;
mod fixed_decimal;

pub use errors::{NumericError, NumericResult};
pub use fixed_decimal::{FixedDecimal, Price, Quantity};
