// Technical indicators module
pub mod sma;

pub use sma::{IndicatorEngine, IndicatorError, IndicatorSnapshot};
