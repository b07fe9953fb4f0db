//! Value shapes and evaluation results

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static shape of a value on the evaluation stack.
///
/// Scalars occupy one stack slot, vectors three contiguous slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Scalar,
    Vector,
}

impl Shape {
    /// Number of stack slots a value of this shape occupies
    pub fn width(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector => 3,
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self, Shape::Vector)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => f.write_str("scalar"),
            Shape::Vector => f.write_str("vector"),
        }
    }
}

/// Result of evaluating a compiled function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Scalar(f64),
    Vector([f64; 3]),
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::Scalar,
            Value::Vector(_) => Shape::Vector,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            Value::Scalar(_) => None,
            Value::Vector(v) => Some(*v),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Vector([x, y, z]) => write!(f, "({x}, {y}, {z})"),
        }
    }
}
