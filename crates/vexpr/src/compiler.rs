//! Range compiler
//!
//! Turns a validated, whitespace-free formula into postfix bytecode by
//! recursive splitting of byte ranges. A range is reduced by the first rule
//! that applies:
//!
//! 1. fully parenthesized: compile the interior
//! 2. a sign followed by a parenthesized group or a call covering the rest:
//!    compile that, then apply the unary operator
//! 3. a call covering the whole range: compile the arguments, then the call
//! 4. a binary operator at nesting depth zero: split on the rightmost one of
//!    the lowest precedence class present
//! 5. otherwise a single operand, possibly signed
//!
//! Operators whose meaning depends on operand shape are emitted in their
//! generic form and resolved later by [`crate::disambiguate`].

use crate::bytecode::Opcode;
use crate::error::{Error, Result};
use crate::functions::{self, Builtin};
use crate::registry::Variables;
use crate::text::{self, Formula, OPERATOR_CHARS};

/// Binary operator classes, lowest precedence first
const PRECEDENCE: &[&[u8]] = &[b"|&=<>", b"+-", b".", b"*/", b"^"];

/// Unresolved output of the range compiler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emitted {
    pub opcodes: Vec<Opcode>,
    pub immediates: Vec<f64>,
}

/// Compile a formula that has already passed [`crate::validate::check_syntax`].
pub fn compile(formula: &Formula, variables: &Variables) -> Result<Emitted> {
    let text = formula.bytes();
    let mut compiler = Compiler {
        formula,
        text,
        mask: text::variable_mask(text, variables),
        variables,
        out: Emitted::default(),
    };
    compiler.range(0, text.len())?;
    Ok(compiler.out)
}

struct Compiler<'a> {
    formula: &'a Formula,
    text: &'a [u8],
    /// Bytes that belong to a variable name
    mask: Vec<bool>,
    variables: &'a Variables,
    out: Emitted,
}

fn binary_opcode(c: u8) -> Opcode {
    match c {
        b'|' => Opcode::Or,
        b'&' => Opcode::And,
        b'=' => Opcode::EqualTo,
        b'<' => Opcode::LessThan,
        b'>' => Opcode::GreaterThan,
        b'+' => Opcode::GenericAdd,
        b'-' => Opcode::GenericSubtract,
        b'.' => Opcode::Dot,
        b'*' => Opcode::GenericMultiply,
        b'/' => Opcode::GenericDivide,
        _ => Opcode::Power,
    }
}

fn unary_opcode(c: u8) -> Option<Opcode> {
    match c {
        b'-' => Some(Opcode::GenericNegate),
        b'+' => Some(Opcode::GenericPlus),
        _ => None,
    }
}

impl Compiler<'_> {
    fn error(&self, message: &str, at: usize) -> Error {
        Error::syntax(message, self.formula.original_position(at))
    }

    fn emit(&mut self, op: Opcode) {
        self.out.opcodes.push(op);
    }

    fn range(&mut self, begin: usize, end: usize) -> Result<()> {
        if begin >= end {
            return Err(self.error("empty expression", begin));
        }

        if self.is_enclosed(begin, end) {
            return self.range(begin + 1, end - 1);
        }

        if let Some(unary) = unary_opcode(self.text[begin]) {
            let rest = begin + 1;
            if self.is_enclosed(rest, end) {
                self.range(rest + 1, end - 1)?;
                self.emit(unary);
                return Ok(());
            }
            if let Some(builtin) = functions::match_call(&self.text[rest..end]) {
                let open = rest + builtin.name.len();
                if self.is_enclosed(open, end) {
                    self.call(builtin, open, end)?;
                    self.emit(unary);
                    return Ok(());
                }
            }
        }

        if let Some(builtin) = functions::match_call(&self.text[begin..end]) {
            let open = begin + builtin.name.len();
            if self.is_enclosed(open, end) {
                return self.call(builtin, open, end);
            }
        }

        if let Some(split) = self.find_split(begin, end) {
            self.range(begin, split)?;
            self.range(split + 1, end)?;
            self.emit(binary_opcode(self.text[split]));
            return Ok(());
        }

        self.operand(begin, end)
    }

    /// Whether `text[begin..end]` is one parenthesized group.
    fn is_enclosed(&self, begin: usize, end: usize) -> bool {
        if end < begin + 2 || self.text[begin] != b'(' || self.text[end - 1] != b')' {
            return false;
        }
        let mut depth = 0usize;
        for i in begin..end {
            match self.text[i] {
                b'(' => depth += 1,
                b')' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && i + 1 < end {
                        return false;
                    }
                }
                _ => {}
            }
        }
        depth == 0
    }

    /// Compile a call whose argument list spans `text[open..end]`.
    fn call(&mut self, builtin: &Builtin, open: usize, end: usize) -> Result<()> {
        let inner = open + 1;
        let close = end - 1;
        match builtin.arity {
            1 => self.range(inner, close)?,
            2 => {
                let comma = self.find_comma(inner, close).ok_or_else(|| {
                    self.error("two parameters separated by commas expected", close)
                })?;
                self.range(inner, comma)?;
                self.range(comma + 1, close)?;
            }
            _ => {
                let second = self.find_comma(inner, close).ok_or_else(|| {
                    self.error("three parameters separated by commas expected", close)
                })?;
                let first = self.find_comma(inner, second).ok_or_else(|| {
                    self.error("three parameters separated by commas expected", second)
                })?;
                // condition ends up on top of the stack
                self.range(second + 1, close)?;
                self.range(first + 1, second)?;
                self.range(inner, first)?;
            }
        }
        self.emit(builtin.opcode);
        Ok(())
    }

    /// Rightmost comma at depth zero in `text[begin..end]`.
    fn find_comma(&self, begin: usize, end: usize) -> Option<usize> {
        let mut depth = 0i32;
        for i in (begin..end).rev() {
            match self.text[i] {
                b')' => depth += 1,
                b'(' => depth -= 1,
                b',' if depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// Position of the binary operator to split `text[begin..end]` on.
    fn find_split(&self, begin: usize, end: usize) -> Option<usize> {
        for class in PRECEDENCE {
            let mut depth = 0i32;
            for i in (begin + 1..end).rev() {
                let c = self.text[i];
                match c {
                    b')' => depth += 1,
                    b'(' => depth -= 1,
                    _ if depth == 0 && class.contains(&c) && self.is_binary_at(begin, i) => {
                        return Some(i);
                    }
                    _ => {}
                }
            }
        }
        None
    }

    /// Whether the operator character at `i` acts as a binary operator.
    fn is_binary_at(&self, begin: usize, i: usize) -> bool {
        if self.mask[i] {
            return false;
        }
        let c = self.text[i];
        let prev = self.text[i - 1];
        match c {
            b'+' | b'-' => {
                if OPERATOR_CHARS.contains(&prev) || prev == b'(' {
                    return false;
                }
                !(matches!(prev, b'e' | b'E') && self.inside_literal(begin, i))
            }
            b'.' => !self.inside_literal(begin, i),
            _ => true,
        }
    }

    /// Whether position `i` falls inside a numeric literal, as the decimal
    /// point or the exponent sign.
    fn inside_literal(&self, begin: usize, i: usize) -> bool {
        let mut start = i;
        while start > begin
            && (self.text[start - 1].is_ascii_alphanumeric() || self.text[start - 1] == b'.')
        {
            start -= 1;
        }
        if start == i {
            // a leading point, as in `.5`
            return text::starts_number(self.text, i);
        }
        text::starts_number(self.text, start)
            && text::scan_number(self.text, start).is_some_and(|stop| stop > i)
    }

    fn operand(&mut self, begin: usize, end: usize) -> Result<()> {
        if let Some(unary) = unary_opcode(self.text[begin]) {
            self.range(begin + 1, end)?;
            self.emit(unary);
            return Ok(());
        }

        let source = self.text;
        let token = &source[begin..end];

        if text::starts_number(source, begin) {
            let stop = text::scan_number(source, begin);
            let value = text::parse_number(source, begin);
            return match (stop, value) {
                (Some(stop), Some(value)) if stop == end => {
                    let idx = self.out.immediates.len() as u32;
                    self.out.immediates.push(value);
                    self.emit(Opcode::Immediate(idx));
                    Ok(())
                }
                _ => Err(self.error("malformed number", begin)),
            };
        }

        if let Some((op, len)) = functions::match_constant(token) {
            if len == token.len() {
                self.emit(op);
                return Ok(());
            }
        }

        match self.variables.longest_match(token) {
            Some(found) if found.len == token.len() => {
                self.emit(Opcode::Load(found.operand as u32));
                Ok(())
            }
            _ => Err(self.error("expecting a variable name", begin)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Opcode::*;

    fn vars() -> Variables {
        let mut vars = Variables::new();
        vars.set_scalar("x", 1.0);
        vars.set_scalar("y", 2.0);
        vars.set_vector("v", [1.0, 0.0, 0.0]);
        vars
    }

    fn ops(text: &str) -> Vec<Opcode> {
        compile(&Formula::new(text), &vars()).unwrap().opcodes
    }

    #[test]
    fn test_single_operand() {
        let out = compile(&Formula::new("2.5"), &vars()).unwrap();
        assert_eq!(out.opcodes, vec![Immediate(0)]);
        assert_eq!(out.immediates, vec![2.5]);
        assert_eq!(ops("y"), vec![Load(1)]);
        assert_eq!(ops("v"), vec![Load(2)]);
        assert_eq!(ops("kHat"), vec![KHat]);
    }

    #[test]
    fn test_precedence_and_associativity() {
        // x + (y * 2)
        assert_eq!(
            ops("x+y*2"),
            vec![Load(0), Load(1), Immediate(0), GenericMultiply, GenericAdd]
        );
        // (x - y) - 2
        assert_eq!(
            ops("x-y-2"),
            vec![Load(0), Load(1), GenericSubtract, Immediate(0), GenericSubtract]
        );
        // (x / y) / 2
        assert_eq!(
            ops("x/y/2"),
            vec![Load(0), Load(1), GenericDivide, Immediate(0), GenericDivide]
        );
    }

    #[test]
    fn test_comparison_binds_looser_than_arithmetic() {
        assert_eq!(
            ops("x+1<y"),
            vec![Load(0), Immediate(0), GenericAdd, Load(1), LessThan]
        );
        // comparison and boolean operators share one class: (x | y) < 1
        assert_eq!(
            ops("x|y<1"),
            vec![Load(0), Load(1), Or, Immediate(0), LessThan]
        );
        // (x < y) > 2
        assert_eq!(
            ops("x<y>2"),
            vec![Load(0), Load(1), LessThan, Immediate(0), GreaterThan]
        );
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(ops("-x"), vec![Load(0), GenericNegate]);
        assert_eq!(ops("2*-x"), vec![Immediate(0), Load(0), GenericNegate, GenericMultiply]);
        assert_eq!(ops("-(x+y)"), vec![Load(0), Load(1), GenericAdd, GenericNegate]);
        assert_eq!(ops("+abs(x)"), vec![Load(0), Abs, GenericPlus]);
        assert_eq!(ops("-+x"), vec![Load(0), GenericPlus, GenericNegate]);
    }

    #[test]
    fn test_literals_are_not_split() {
        let out = compile(&Formula::new("2e-3-x"), &vars()).unwrap();
        assert_eq!(out.opcodes, vec![Immediate(0), Load(0), GenericSubtract]);
        assert_eq!(out.immediates, vec![2e-3]);

        let out = compile(&Formula::new("1.5.v"), &vars());
        assert!(out.is_ok());

        let out = compile(&Formula::new("x*.5"), &vars()).unwrap();
        assert_eq!(out.opcodes, vec![Load(0), Immediate(0), GenericMultiply]);
        assert_eq!(out.immediates, vec![0.5]);
    }

    #[test]
    fn test_dot_operator() {
        assert_eq!(ops("v.v"), vec![Load(2), Load(2), Dot]);
    }

    #[test]
    fn test_calls() {
        assert_eq!(ops("min(x,y)"), vec![Load(0), Load(1), Min]);
        assert_eq!(
            ops("max(min(x,y),2)"),
            vec![Load(0), Load(1), Min, Immediate(0), Max]
        );
        assert_eq!(ops("cross(v,iHat)"), vec![Load(2), IHat, Cross]);
    }

    #[test]
    fn test_if_pushes_condition_last() {
        assert_eq!(
            ops("if(x<y,v,kHat)"),
            vec![KHat, Load(2), Load(0), Load(1), LessThan, GenericIf]
        );
    }

    #[test]
    fn test_call_name_needs_parenthesis() {
        let mut vars = Variables::new();
        vars.set_scalar("absolutex", 3.0);
        vars.set_scalar("y", 4.0);
        let out = compile(&Formula::new("absolutex-(y)"), &vars).unwrap();
        assert_eq!(out.opcodes, vec![Load(0), Load(1), GenericSubtract]);
    }

    #[test]
    fn test_variable_names_with_operators() {
        let mut vars = Variables::new();
        vars.set_scalar("a-b", 5.0);
        vars.set_scalar("c", 1.0);
        let out = compile(&Formula::new("a-b-c"), &vars).unwrap();
        assert_eq!(out.opcodes, vec![Load(0), Load(1), GenericSubtract]);
    }

    #[test]
    fn test_operator_name_inside_another_operand_is_not_masked() {
        let mut vars = Variables::new();
        vars.set_scalar("xa", 10.0);
        vars.set_scalar("a-b", 100.0);
        vars.set_scalar("b", 1.0);
        let out = compile(&Formula::new("xa-b"), &vars).unwrap();
        assert_eq!(out.opcodes, vec![Load(0), Load(2), GenericSubtract]);
    }

    #[test]
    fn test_power_splits_rightmost() {
        // (2 ^ 3) ^ 2
        assert_eq!(
            ops("2^3^2"),
            vec![Immediate(0), Immediate(1), Power, Immediate(2), Power]
        );
    }
}
