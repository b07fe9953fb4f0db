//! Bytecode instruction set
//!
//! Flat instruction encoding for the stack machine. The compiler emits the
//! `Generic*` variants wherever an operator's meaning depends on operand
//! shape; the disambiguation pass rewrites each of them into its concrete
//! scalar or vector form before a [`Program`] is handed out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Shape;

/// Bytecode instruction
///
/// Stack-based: operands are popped from the stack, results pushed back.
/// Scalars occupy one slot and vectors three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // === Literals and loads ===
    /// Push a literal value (index into the immediates table)
    Immediate(u32),
    /// Push a variable by unified operand index (scalars first, then vectors)
    Load(u32),
    /// Push the unit vector (1, 0, 0)
    IHat,
    /// Push the unit vector (0, 1, 0)
    JHat,
    /// Push the unit vector (0, 0, 1)
    KHat,

    // === Shape-generic, resolved by disambiguation ===
    GenericNegate,
    GenericPlus,
    GenericAdd,
    GenericSubtract,
    GenericMultiply,
    GenericDivide,
    /// `if(cond, a, b)` with the condition on top, `a` below it and `b` deepest
    GenericIf,

    // === Scalar arithmetic ===
    Negate,
    Plus,
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // === Vector arithmetic ===
    VectorNegate,
    VectorPlus,
    VectorAdd,
    VectorSubtract,
    ScalarTimesVector,
    VectorTimesScalar,
    VectorOverScalar,
    /// Two vectors in, one scalar out
    Dot,
    Cross,
    /// One vector in, one scalar out
    Magnitude,
    Normalize,

    // === Scalar functions ===
    Abs,
    Exp,
    Ceil,
    Floor,
    /// Deprecated spelling of `Ln`
    Log,
    Ln,
    Log10,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Sign,
    Min,
    Max,

    // === Comparison and logic (1.0 for true, 0.0 for false) ===
    LessThan,
    GreaterThan,
    EqualTo,
    And,
    Or,

    // === Selection ===
    If,
    VectorIf,
}

impl Opcode {
    /// Number of values (not slots) the instruction consumes.
    pub fn arity(self) -> usize {
        use Opcode::*;
        match self {
            Immediate(_) | Load(_) | IHat | JHat | KHat => 0,

            GenericNegate | GenericPlus | Negate | Plus | VectorNegate | VectorPlus | Magnitude
            | Normalize | Abs | Exp | Ceil | Floor | Log | Ln | Log10 | Sqrt | Sin | Cos | Tan
            | Asin | Acos | Atan | Sinh | Cosh | Tanh | Sign => 1,

            GenericAdd | GenericSubtract | GenericMultiply | GenericDivide | Add | Subtract
            | Multiply | Divide | Power | VectorAdd | VectorSubtract | ScalarTimesVector
            | VectorTimesScalar | VectorOverScalar | Dot | Cross | Min | Max | LessThan
            | GreaterThan | EqualTo | And | Or => 2,

            GenericIf | If | VectorIf => 3,
        }
    }

    /// Whether the instruction still awaits shape resolution
    pub fn is_generic(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            GenericNegate
                | GenericPlus
                | GenericAdd
                | GenericSubtract
                | GenericMultiply
                | GenericDivide
                | GenericIf
        )
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Immediate(_) => "imm",
            Load(_) => "load",
            IHat => "ihat",
            JHat => "jhat",
            KHat => "khat",
            GenericNegate => "neg?",
            GenericPlus => "plus?",
            GenericAdd => "add?",
            GenericSubtract => "sub?",
            GenericMultiply => "mul?",
            GenericDivide => "div?",
            GenericIf => "if?",
            Negate => "neg",
            Plus => "plus",
            Add => "add",
            Subtract => "sub",
            Multiply => "mul",
            Divide => "div",
            Power => "pow",
            VectorNegate => "vneg",
            VectorPlus => "vplus",
            VectorAdd => "vadd",
            VectorSubtract => "vsub",
            ScalarTimesVector => "smulv",
            VectorTimesScalar => "vmuls",
            VectorOverScalar => "vdivs",
            Dot => "dot",
            Cross => "cross",
            Magnitude => "mag",
            Normalize => "norm",
            Abs => "abs",
            Exp => "exp",
            Ceil => "ceil",
            Floor => "floor",
            Log => "log",
            Ln => "ln",
            Log10 => "log10",
            Sqrt => "sqrt",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Asin => "asin",
            Acos => "acos",
            Atan => "atan",
            Sinh => "sinh",
            Cosh => "cosh",
            Tanh => "tanh",
            Sign => "sign",
            Min => "min",
            Max => "max",
            LessThan => "lt",
            GreaterThan => "gt",
            EqualTo => "eq",
            And => "and",
            Or => "or",
            If => "if",
            VectorIf => "vif",
        }
    }
}

/// A compiled, shape-resolved program
///
/// Only produced by a compile that passed validation and disambiguation, so
/// it never contains a generic instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub(crate) opcodes: Vec<Opcode>,
    pub(crate) immediates: Vec<f64>,
    /// Worst-case number of stack slots live at once
    pub(crate) stack_size: usize,
    pub(crate) result: Shape,
    /// Registry layout version the operand indices refer to
    pub(crate) layout: u64,
}

impl Program {
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn immediates(&self) -> &[f64] {
        &self.immediates
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Shape of the value left on the stack after execution
    pub fn result_shape(&self) -> Shape {
        self.result
    }

    pub fn layout(&self) -> u64 {
        self.layout
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; {} ops, stack {}, yields {}",
            self.opcodes.len(),
            self.stack_size,
            self.result
        )?;
        for (ip, op) in self.opcodes.iter().enumerate() {
            match op {
                Opcode::Immediate(idx) => {
                    let value = self.immediates.get(*idx as usize).copied().unwrap_or(f64::NAN);
                    writeln!(f, "{ip:4}  {:<6} {value}", op.mnemonic())?;
                }
                Opcode::Load(operand) => writeln!(f, "{ip:4}  {:<6} #{operand}", op.mnemonic())?,
                _ => writeln!(f, "{ip:4}  {}", op.mnemonic())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert_eq!(Opcode::Immediate(0).arity(), 0);
        assert_eq!(Opcode::Normalize.arity(), 1);
        assert_eq!(Opcode::Cross.arity(), 2);
        assert_eq!(Opcode::GenericIf.arity(), 3);
    }

    #[test]
    fn test_generic_classification() {
        assert!(Opcode::GenericMultiply.is_generic());
        assert!(!Opcode::Multiply.is_generic());
        assert!(!Opcode::ScalarTimesVector.is_generic());
    }

    #[test]
    fn test_disassembly() {
        let program = Program {
            opcodes: vec![Opcode::Immediate(0), Opcode::Load(1), Opcode::Add],
            immediates: vec![2.5],
            stack_size: 2,
            result: Shape::Scalar,
            layout: 0,
        };
        let text = program.to_string();
        assert!(text.starts_with("; 3 ops, stack 2, yields scalar"));
        assert!(text.contains("imm    2.5"));
        assert!(text.contains("load   #1"));
        assert!(text.contains("add"));
    }

    #[test]
    fn test_opcode_serializes() {
        let json = serde_json::to_string(&vec![Opcode::Load(3), Opcode::VectorIf]).unwrap();
        assert_eq!(json, r#"[{"Load":3},"VectorIf"]"#);
        let back: Vec<Opcode> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Opcode::Load(3), Opcode::VectorIf]);
    }
}
