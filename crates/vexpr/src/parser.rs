//! The `FunctionParser` facade
//!
//! Owns the formula, the variable registry, the compiled program and the
//! evaluation stack, and decides when each needs rebuilding. Compilation is
//! lazy: nothing happens until a result is asked for. After that the program
//! is reused for as long as the formula text and the variable layout stay
//! the same, and the stack machine only re-runs when something it depends on
//! has been touched since the last evaluation.

use std::fmt;

use tracing::{debug, error, instrument, trace};

use crate::bytecode::Program;
use crate::clock::{ModificationClock, Stamp};
use crate::compiler::{self, Emitted};
use crate::config::EvalConfig;
use crate::disambiguate::{NeededVariables, disambiguate};
use crate::error::{Error, Result};
use crate::executor::{self, EvalStack};
use crate::registry::{Change, VariableKind, Variables};
use crate::text::Formula;
use crate::validate;
use crate::value::{Shape, Value};

/// Whether the compiled program matches the current formula and layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stale,
    Valid,
}

/// Outcome of the last grammar check, reused until the formula or the
/// variable layout changes.
#[derive(Debug, Clone)]
struct ValidationMemo {
    function: u64,
    layout: u64,
    outcome: Result<()>,
}

/// Compiles and evaluates a formula over named scalar and vector variables.
///
/// ```
/// use vexpr::FunctionParser;
///
/// let mut parser = FunctionParser::new();
/// parser.set_function(Some("mag(v) * s"));
/// parser.set_scalar_variable("s", 2.0);
/// parser.set_vector_variable("v", 3.0, 4.0, 0.0);
/// assert_eq!(parser.scalar_result(), Ok(10.0));
/// ```
#[derive(Debug, Clone)]
pub struct FunctionParser {
    formula: Option<Formula>,
    variables: Variables,
    config: EvalConfig,
    state: State,
    program: Option<Program>,
    needed: NeededVariables,
    stack: EvalStack,
    result: Option<Value>,
    clock: ModificationClock,
    validation: Option<ValidationMemo>,
    parse_error: Option<(String, usize)>,
}

impl Default for FunctionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionParser {
    pub fn new() -> Self {
        Self {
            formula: None,
            variables: Variables::new(),
            config: EvalConfig::default(),
            state: State::Stale,
            program: None,
            needed: NeededVariables::default(),
            stack: EvalStack::new(),
            result: None,
            clock: ModificationClock::new(),
            validation: None,
            parse_error: None,
        }
    }

    // === Formula ===

    /// Replace the formula. Setting the text it already has does nothing.
    pub fn set_function(&mut self, text: Option<&str>) {
        if self.function() == text {
            return;
        }
        self.formula = text.map(Formula::new);
        self.needed.clear();
        self.state = State::Stale;
        self.clock.touch(Stamp::Function);
    }

    pub fn function(&self) -> Option<&str> {
        self.formula.as_ref().map(Formula::original)
    }

    /// Force a recompile on the next query without changing the formula.
    pub fn invalidate(&mut self) {
        self.state = State::Stale;
        self.clock.touch(Stamp::Function);
    }

    pub fn state(&self) -> State {
        if self.is_current() {
            State::Valid
        } else {
            State::Stale
        }
    }

    /// The compiled program, if it is current.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref().filter(|_| self.is_current())
    }

    /// Message and original-text position of the last syntax error.
    pub fn parse_error(&self) -> Option<(&str, usize)> {
        self.parse_error
            .as_ref()
            .map(|(message, position)| (message.as_str(), *position))
    }

    fn is_current(&self) -> bool {
        self.state == State::Valid
            && self
                .program
                .as_ref()
                .is_some_and(|p| p.layout == self.variables.layout())
    }

    /// Validate, compile and resolve the formula against the current
    /// variables.
    ///
    /// Called on demand by every result query; calling it directly only
    /// surfaces compile errors early.
    #[instrument(skip(self), name = "compile")]
    pub fn compile(&mut self) -> Result<()> {
        match self.build() {
            Ok(program) => {
                debug!(
                    ops = program.opcodes.len(),
                    stack = program.stack_size,
                    result = %program.result,
                    "compiled"
                );
                self.needed = NeededVariables::scan(&program.opcodes, &self.variables);
                self.stack.reset(program.stack_size);
                self.program = Some(program);
                self.state = State::Valid;
                self.parse_error = None;
                self.clock.touch(Stamp::Parse);
                Ok(())
            }
            Err(err) => {
                debug!(%err, "compile failed");
                self.program = None;
                self.state = State::Stale;
                self.needed.clear();
                self.parse_error = match &err {
                    Error::Syntax { message, position } => Some((message.clone(), *position)),
                    _ => None,
                };
                Err(err)
            }
        }
    }

    fn build(&mut self) -> Result<Program> {
        let formula = self.formula.as_ref().ok_or(Error::NoFunction)?;
        let function = self.clock.get(Stamp::Function);
        let layout = self.variables.layout();

        let outcome = match &self.validation {
            Some(memo) if memo.function == function && memo.layout == layout => {
                memo.outcome.clone()
            }
            _ => {
                let outcome = validate::check_syntax(formula, &self.variables);
                self.validation = Some(ValidationMemo {
                    function,
                    layout,
                    outcome: outcome.clone(),
                });
                outcome
            }
        };
        outcome?;

        let Emitted {
            mut opcodes,
            immediates,
        } = compiler::compile(formula, &self.variables)?;
        let shape = disambiguate(&mut opcodes, &self.variables)?;

        Ok(Program {
            opcodes,
            immediates,
            stack_size: shape.max_slots,
            result: shape.result,
            layout,
        })
    }

    // === Evaluation ===

    fn needs_execution(&self) -> bool {
        let inputs = [Stamp::Base, Stamp::Function, Stamp::Variables, Stamp::Parse]
            .into_iter()
            .map(|s| self.clock.get(s))
            .max()
            .unwrap_or(0);
        self.result.is_none() || self.clock.get(Stamp::Evaluate) < inputs
    }

    /// Current value of the formula, compiling and executing only as needed.
    pub fn evaluate(&mut self) -> Result<Value> {
        if !self.is_current() {
            self.compile()?;
        }
        if let Some(result) = self.result.filter(|_| !self.needs_execution()) {
            return Ok(result);
        }

        let program = self.program.as_ref().ok_or(Error::NoResult)?;
        match executor::execute(program, &self.variables, &self.config, &mut self.stack) {
            Ok(value) => {
                trace!(%value, "evaluated");
                self.result = Some(value);
                self.clock.touch(Stamp::Evaluate);
                Ok(value)
            }
            Err(err) => {
                debug!(%err, "evaluation failed");
                Err(err)
            }
        }
    }

    /// Shape of the result, or `None` when there is no valid result.
    pub fn result_shape(&mut self) -> Option<Shape> {
        match self.evaluate() {
            Ok(value) => Some(value.shape()),
            Err(err) => {
                debug!(%err, "no result");
                None
            }
        }
    }

    pub fn is_scalar_result(&mut self) -> bool {
        self.result_shape() == Some(Shape::Scalar)
    }

    pub fn is_vector_result(&mut self) -> bool {
        self.result_shape() == Some(Shape::Vector)
    }

    pub fn scalar_result(&mut self) -> Result<f64> {
        match self.evaluate()? {
            Value::Scalar(v) => Ok(v),
            other => Err(Error::ResultShape {
                expected: Shape::Scalar,
                actual: other.shape(),
            }),
        }
    }

    pub fn vector_result(&mut self) -> Result<[f64; 3]> {
        match self.evaluate()? {
            Value::Vector(v) => Ok(v),
            other => Err(Error::ResultShape {
                expected: Shape::Vector,
                actual: other.shape(),
            }),
        }
    }

    // === Variables ===

    fn record(&mut self, change: Change) {
        match change {
            Change::Unchanged => {}
            Change::Updated => self.clock.touch(Stamp::Variables),
            Change::Appended => {
                self.state = State::Stale;
                self.clock.touch(Stamp::Variables);
            }
        }
    }

    fn record_removal(&mut self, removed: bool) {
        if removed {
            self.state = State::Stale;
            self.needed.clear();
            self.clock.touch(Stamp::Variables);
        }
    }

    /// Set a scalar, adding it if the name is new.
    pub fn set_scalar_variable(&mut self, name: &str, value: f64) {
        let change = self.variables.set_scalar(name, value);
        self.record(change);
    }

    pub fn set_scalar_variable_at(&mut self, index: usize, value: f64) -> Result<()> {
        let change = self.variables.set_scalar_at(index, value)?;
        self.record(change);
        Ok(())
    }

    /// Set a vector, adding it if the name is new.
    pub fn set_vector_variable(&mut self, name: &str, x: f64, y: f64, z: f64) {
        let change = self.variables.set_vector(name, [x, y, z]);
        self.record(change);
    }

    pub fn set_vector_variable_at(&mut self, index: usize, x: f64, y: f64, z: f64) -> Result<()> {
        let change = self.variables.set_vector_at(index, [x, y, z])?;
        self.record(change);
        Ok(())
    }

    pub fn scalar_variable(&self, name: &str) -> Result<f64> {
        self.variables.scalar(name)
    }

    pub fn scalar_variable_at(&self, index: usize) -> Result<f64> {
        self.variables.scalar_at(index)
    }

    pub fn vector_variable(&self, name: &str) -> Result<[f64; 3]> {
        self.variables.vector(name)
    }

    pub fn vector_variable_at(&self, index: usize) -> Result<[f64; 3]> {
        self.variables.vector_at(index)
    }

    pub fn scalar_variable_name(&self, index: usize) -> Option<&str> {
        self.variables.name_at(VariableKind::Scalar, index)
    }

    pub fn vector_variable_name(&self, index: usize) -> Option<&str> {
        self.variables.name_at(VariableKind::Vector, index)
    }

    pub fn number_of_scalar_variables(&self) -> usize {
        self.variables.count(VariableKind::Scalar)
    }

    pub fn number_of_vector_variables(&self) -> usize {
        self.variables.count(VariableKind::Vector)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    fn needed_by_name(&self, kind: VariableKind, name: &str) -> bool {
        match self.variables.index_of(kind, name) {
            Some(index) => self.needed.get(kind, index),
            None => {
                error!(%kind, name, "variable does not exist");
                false
            }
        }
    }

    fn needed_by_index(&self, kind: VariableKind, index: usize) -> bool {
        let count = self.variables.count(kind);
        if index >= count {
            error!(%kind, index, count, "variable index out of range");
            return false;
        }
        self.needed.get(kind, index)
    }

    /// Whether the last compiled program reads the named scalar.
    pub fn scalar_variable_needed(&self, name: &str) -> bool {
        self.needed_by_name(VariableKind::Scalar, name)
    }

    pub fn scalar_variable_needed_at(&self, index: usize) -> bool {
        self.needed_by_index(VariableKind::Scalar, index)
    }

    /// Whether the last compiled program reads the named vector.
    pub fn vector_variable_needed(&self, name: &str) -> bool {
        self.needed_by_name(VariableKind::Vector, name)
    }

    pub fn vector_variable_needed_at(&self, index: usize) -> bool {
        self.needed_by_index(VariableKind::Vector, index)
    }

    pub fn remove_all_variables(&mut self) {
        let removed = self.variables.remove_all();
        self.record_removal(removed);
    }

    pub fn remove_scalar_variables(&mut self) {
        let removed = self.variables.remove_scalars();
        self.record_removal(removed);
    }

    pub fn remove_vector_variables(&mut self) {
        let removed = self.variables.remove_vectors();
        self.record_removal(removed);
    }

    // === Settings ===

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Replace all evaluation settings at once.
    pub fn set_config(&mut self, config: EvalConfig) {
        if self.config != config {
            self.config = config;
            self.clock.touch(Stamp::Base);
        }
    }

    pub fn replace_invalid_values(&self) -> bool {
        self.config.replace_invalid
    }

    pub fn set_replace_invalid_values(&mut self, replace: bool) {
        self.set_config(EvalConfig {
            replace_invalid: replace,
            ..self.config
        });
    }

    pub fn replacement_value(&self) -> f64 {
        self.config.replacement_value
    }

    pub fn set_replacement_value(&mut self, value: f64) {
        self.set_config(EvalConfig {
            replacement_value: value,
            ..self.config
        });
    }

    // === Clocks ===

    /// Latest modification stamp of anything this parser tracks.
    pub fn last_modified(&self) -> u64 {
        self.clock.last_modified()
    }

    pub fn clock(&self) -> &ModificationClock {
        &self.clock
    }
}

impl fmt::Display for FunctionParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function() {
            Some(text) => writeln!(f, "function: {text}")?,
            None => writeln!(f, "function: (none)")?,
        }
        writeln!(f, "state: {:?}", self.state())?;
        for (name, value) in self.variables.scalars() {
            writeln!(f, "scalar {name} = {value}")?;
        }
        for (name, [x, y, z]) in self.variables.vectors() {
            writeln!(f, "vector {name} = ({x}, {y}, {z})")?;
        }
        if self.config.replace_invalid {
            writeln!(
                f,
                "invalid values replaced with {}",
                self.config.replacement_value
            )?;
        }
        if let Some(result) = self.result.filter(|_| !self.needs_execution()) {
            writeln!(f, "result: {result}")?;
        }
        if let Some((message, position)) = self.parse_error() {
            writeln!(f, "parse error at {position}: {message}")?;
        }
        Ok(())
    }
}
