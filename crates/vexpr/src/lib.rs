//! Vexpr - scalar/vector formula compiler and evaluator
//!
//! Compiles infix formulas over named scalar and 3-vector variables into
//! flat bytecode, resolves scalar/vector operator overloads in a separate
//! pass, and evaluates the result on a small stack machine. Designed for
//! evaluating one formula many times with only variable values changing.
//!
//! The pipeline runs [`validate`] → [`compiler`] → [`disambiguate`] →
//! [`executor`]; [`FunctionParser`] drives it lazily.

pub mod bytecode;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod disambiguate;
pub mod error;
pub mod executor;
pub mod functions;
pub mod parser;
pub mod registry;
pub mod text;
pub mod validate;
pub mod value;

pub use bytecode::{Opcode, Program};
pub use clock::{ModificationClock, Stamp};
pub use config::EvalConfig;
pub use error::{ERROR_RESULT, ERROR_VECTOR, Error, OrSentinel, Result};
pub use parser::{FunctionParser, State};
pub use registry::{Change, VariableKind, Variables};
pub use value::{Shape, Value};
