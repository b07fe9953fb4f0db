//! Evaluation settings

use serde::{Deserialize, Serialize};

/// How the executor treats arguments outside an operation's domain
///
/// With `replace_invalid` off, division by zero, the log of a non-positive
/// value, the root of a negative value and `asin`/`acos` outside `[-1, 1]`
/// abort the evaluation with a domain error. With it on, the offending
/// result becomes `replacement_value` and evaluation carries on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub replace_invalid: bool,
    pub replacement_value: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            replace_invalid: false,
            replacement_value: 0.0,
        }
    }
}

impl EvalConfig {
    /// Replace invalid results with `value`.
    pub fn replacing_with(value: f64) -> Self {
        Self {
            replace_invalid: true,
            replacement_value: value,
        }
    }
}
