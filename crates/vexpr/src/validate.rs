//! Grammar validation
//!
//! A single left-to-right scan over the whitespace-free formula that checks
//! it is well formed before any code is generated. The scan alternates
//! between expecting an operand and expecting an operator, tracking one frame
//! per open parenthesis so multi-argument calls can count their commas.
//!
//! Every error position is mapped back to the formula as supplied.

use tracing::warn;

use crate::error::{Error, Result};
use crate::functions::{self, Builtin};
use crate::registry::Variables;
use crate::text::{self, Formula, OPERATOR_CHARS};

/// One open parenthesis
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Arguments the enclosing call takes (1 for a plain group)
    arity: usize,
    commas: usize,
}

impl Frame {
    fn group() -> Self {
        Self {
            arity: 1,
            commas: 0,
        }
    }

    fn call(builtin: &Builtin) -> Self {
        Self {
            arity: builtin.arity,
            commas: 0,
        }
    }

    fn arity_message(&self) -> &'static str {
        match self.arity {
            2 => "two parameters separated by commas expected",
            3 => "three parameters separated by commas expected",
            _ => "unexpected comma",
        }
    }
}

struct Validator<'a> {
    formula: &'a Formula,
    text: &'a [u8],
    variables: &'a Variables,
    index: usize,
    frames: Vec<Frame>,
}

/// Check that `formula` is a well formed expression over `variables`.
pub fn check_syntax(formula: &Formula, variables: &Variables) -> Result<()> {
    let mut validator = Validator {
        formula,
        text: formula.bytes(),
        variables,
        index: 0,
        frames: Vec::new(),
    };
    validator.run()
}

impl Validator<'_> {
    fn error(&self, message: &str, at: usize) -> Error {
        Error::syntax(message, self.formula.original_position(at))
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.index).copied()
    }

    fn run(&mut self) -> Result<()> {
        if self.text.is_empty() {
            return Err(self.error("empty function", 0));
        }

        loop {
            self.operand()?;

            if self.close_and_separate()? {
                continue;
            }

            let Some(c) = self.peek() else {
                break;
            };
            if !OPERATOR_CHARS.contains(&c) {
                return Err(self.error("operator expected", self.index));
            }
            self.index += 1;
        }

        if !self.frames.is_empty() {
            return Err(self.error("missing closing parenthesis", self.index));
        }
        Ok(())
    }

    /// Consume one operand, along with any opening parentheses and unary
    /// signs in front of it.
    fn operand(&mut self) -> Result<()> {
        loop {
            if self.peek() == Some(b'-') {
                self.index += 1;
                if self.peek().is_none() {
                    return Err(self.error("unary minus with no operand", self.index));
                }
            }
            if self.peek() == Some(b'+') {
                self.index += 1;
                if self.peek().is_none() {
                    return Err(self.error("unary plus with no operand", self.index));
                }
            }

            let rest = &self.text[self.index..];
            if let Some(builtin) = functions::match_call(rest) {
                if builtin.deprecated {
                    warn!(
                        function = builtin.name,
                        "deprecated function, use log10 or ln instead"
                    );
                }
                self.frames.push(Frame::call(builtin));
                self.index += builtin.name.len() + 1;
                continue;
            }

            if self.peek() == Some(b'(') {
                self.frames.push(Frame::group());
                self.index += 1;
                continue;
            }

            break;
        }

        let Some(c) = self.peek() else {
            return Err(self.error("premature end of function, operand expected", self.index));
        };

        if c == b')' {
            let message = if self.index > 0 && self.text[self.index - 1] == b'(' {
                "empty parentheses"
            } else {
                "operand expected before closing parenthesis"
            };
            return Err(self.error(message, self.index));
        }

        if text::starts_number(self.text, self.index) {
            if let Some(end) = text::scan_number(self.text, self.index) {
                self.index = end;
                return Ok(());
            }
        }

        let rest = &self.text[self.index..];
        if let Some((_, len)) = functions::match_constant(rest) {
            self.index += len;
            return Ok(());
        }

        if let Some(found) = self.variables.longest_match(rest) {
            self.index += found.len;
            return Ok(());
        }

        Err(self.error("expecting a variable name", self.index))
    }

    /// Consume closing parentheses after an operand, then an argument comma
    /// if one is allowed. Returns `true` when a comma was taken and another
    /// operand must follow.
    fn close_and_separate(&mut self) -> Result<bool> {
        while self.peek() == Some(b')') {
            let Some(frame) = self.frames.pop() else {
                return Err(self.error("mismatched parenthesis", self.index));
            };
            if frame.commas + 1 != frame.arity {
                return Err(self.error(frame.arity_message(), self.index));
            }
            self.index += 1;
        }

        if self.peek() != Some(b',') {
            return Ok(false);
        }

        match self.frames.last_mut() {
            Some(frame) if frame.commas + 1 < frame.arity => {
                frame.commas += 1;
                self.index += 1;
                Ok(true)
            }
            Some(frame) => {
                let message = frame.arity_message();
                Err(self.error(message, self.index))
            }
            None => Err(self.error("unexpected comma", self.index)),
        }
    }
}
