//! Shape resolution
//!
//! Walks emitted bytecode with a shadow stack of operand shapes, rewriting
//! each generic instruction into its scalar or vector form and rejecting
//! operand shapes an instruction cannot take. The same walk measures the
//! worst-case number of live stack slots, which sizes the evaluation stack.

use crate::bytecode::Opcode;
use crate::error::{Error, Result};
use crate::registry::{VariableKind, Variables};
use crate::value::Shape;

use Shape::{Scalar, Vector};

/// Stack requirements of a resolved program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackShape {
    /// Most slots live at any point
    pub max_slots: usize,
    /// Shape left on the stack at the end
    pub result: Shape,
}

struct ShadowStack {
    shapes: Vec<Shape>,
    slots: usize,
    max_slots: usize,
}

impl ShadowStack {
    fn push(&mut self, shape: Shape) {
        self.shapes.push(shape);
        self.slots += shape.width();
        self.max_slots = self.max_slots.max(self.slots);
    }

    fn pop(&mut self, op: Opcode) -> Result<Shape> {
        let shape = self.shapes.pop().ok_or_else(|| {
            Error::type_error(format!("'{}' is missing an operand", op.mnemonic()))
        })?;
        self.slots -= shape.width();
        Ok(shape)
    }

    /// Pop two operands, returning them in push order.
    fn pop_pair(&mut self, op: Opcode) -> Result<(Shape, Shape)> {
        let right = self.pop(op)?;
        let left = self.pop(op)?;
        Ok((left, right))
    }
}

/// Error message for a scalar-only function handed a vector
fn scalar_function_message(op: Opcode) -> String {
    match op {
        Opcode::Min => "can't apply min to vectors".to_string(),
        Opcode::Max => "can't apply max to vectors".to_string(),
        Opcode::Power => "can't raise a vector to a power".to_string(),
        Opcode::LessThan | Opcode::GreaterThan | Opcode::EqualTo | Opcode::And | Opcode::Or => {
            "vectors cannot be used in boolean expressions".to_string()
        }
        _ => format!("{} expects a scalar, but got a vector", op.mnemonic()),
    }
}

/// Resolve every generic instruction in place and check operand shapes.
pub fn disambiguate(opcodes: &mut [Opcode], variables: &Variables) -> Result<StackShape> {
    let mut stack = ShadowStack {
        shapes: Vec::with_capacity(opcodes.len()),
        slots: 0,
        max_slots: 0,
    };

    for op in opcodes.iter_mut() {
        use Opcode::*;
        let resolved = match *op {
            Immediate(_) => {
                stack.push(Scalar);
                continue;
            }
            Load(operand) => {
                let (kind, _) = variables.resolve_operand(operand as usize).ok_or_else(|| {
                    Error::type_error(format!("operand #{operand} is not a variable"))
                })?;
                stack.push(kind.shape());
                continue;
            }
            IHat | JHat | KHat => {
                stack.push(Vector);
                continue;
            }

            GenericNegate | GenericPlus => {
                let shape = stack.pop(*op)?;
                stack.push(shape);
                match (*op, shape) {
                    (GenericNegate, Scalar) => Negate,
                    (GenericNegate, Vector) => VectorNegate,
                    (_, Scalar) => Plus,
                    (_, Vector) => VectorPlus,
                }
            }

            GenericAdd | GenericSubtract => {
                let adding = *op == GenericAdd;
                match stack.pop_pair(*op)? {
                    (Scalar, Scalar) => {
                        stack.push(Scalar);
                        if adding { Add } else { Subtract }
                    }
                    (Vector, Vector) => {
                        stack.push(Vector);
                        if adding { VectorAdd } else { VectorSubtract }
                    }
                    _ if adding => {
                        return Err(Error::type_error(
                            "addition expects either 2 vectors or 2 scalars",
                        ));
                    }
                    _ => {
                        return Err(Error::type_error(
                            "subtraction expects either 2 vectors or 2 scalars",
                        ));
                    }
                }
            }

            GenericMultiply => match stack.pop_pair(*op)? {
                (Scalar, Scalar) => {
                    stack.push(Scalar);
                    Multiply
                }
                (Scalar, Vector) => {
                    stack.push(Vector);
                    ScalarTimesVector
                }
                (Vector, Scalar) => {
                    stack.push(Vector);
                    VectorTimesScalar
                }
                (Vector, Vector) => {
                    return Err(Error::type_error(
                        "multiply expects either 2 scalars or a scalar and a vector",
                    ));
                }
            },

            GenericDivide => match stack.pop_pair(*op)? {
                (Scalar, Scalar) => {
                    stack.push(Scalar);
                    Divide
                }
                (Vector, Scalar) => {
                    stack.push(Vector);
                    VectorOverScalar
                }
                _ => return Err(Error::type_error("can't divide by a vector")),
            },

            GenericIf | If | VectorIf => {
                let condition = stack.pop(*op)?;
                let when_true = stack.pop(*op)?;
                let when_false = stack.pop(*op)?;
                if condition.is_vector() {
                    return Err(Error::type_error(
                        "the first argument of if cannot be a vector",
                    ));
                }
                if when_true != when_false {
                    return Err(Error::type_error(
                        "the second and third arguments of if must be the same shape",
                    ));
                }
                stack.push(when_true);
                match when_true {
                    Scalar => If,
                    Vector => VectorIf,
                }
            }

            // fixed signatures from here on
            Negate | Plus | Abs | Exp | Ceil | Floor | Log | Ln | Log10 | Sqrt | Sin | Cos
            | Tan | Asin | Acos | Atan | Sinh | Cosh | Tanh | Sign => {
                if stack.pop(*op)?.is_vector() {
                    return Err(Error::type_error(scalar_function_message(*op)));
                }
                stack.push(Scalar);
                *op
            }

            Add | Subtract | Multiply | Divide | Power | Min | Max | LessThan | GreaterThan
            | EqualTo | And | Or => {
                let (left, right) = stack.pop_pair(*op)?;
                if left.is_vector() || right.is_vector() {
                    return Err(Error::type_error(scalar_function_message(*op)));
                }
                stack.push(Scalar);
                *op
            }

            VectorNegate | VectorPlus | Normalize => {
                if !stack.pop(*op)?.is_vector() {
                    let message = match *op {
                        Normalize => "normalize expects a vector, but got a scalar".to_string(),
                        other => format!("{} expects a vector, but got a scalar", other.mnemonic()),
                    };
                    return Err(Error::type_error(message));
                }
                stack.push(Vector);
                *op
            }

            Magnitude => {
                if !stack.pop(*op)?.is_vector() {
                    return Err(Error::type_error(
                        "magnitude expects a vector, but got a scalar",
                    ));
                }
                stack.push(Scalar);
                Magnitude
            }

            VectorAdd | VectorSubtract | Cross | Dot => {
                let (left, right) = stack.pop_pair(*op)?;
                if !left.is_vector() || !right.is_vector() {
                    let message = match *op {
                        Cross => "can't apply cross to scalars",
                        Dot => "dot product does not operate on scalars",
                        _ => "vector arithmetic expects two vectors",
                    };
                    return Err(Error::type_error(message));
                }
                stack.push(if *op == Dot { Scalar } else { Vector });
                *op
            }

            ScalarTimesVector | VectorTimesScalar | VectorOverScalar => {
                let expected = match *op {
                    ScalarTimesVector => (Scalar, Vector),
                    _ => (Vector, Scalar),
                };
                if stack.pop_pair(*op)? != expected {
                    return Err(Error::type_error(format!(
                        "{} expects a {} and a {}",
                        op.mnemonic(),
                        expected.0,
                        expected.1
                    )));
                }
                stack.push(Vector);
                *op
            }
        };
        *op = resolved;
    }

    match stack.shapes.as_slice() {
        [result] => Ok(StackShape {
            max_slots: stack.max_slots,
            result: *result,
        }),
        [] => Err(Error::type_error("expression yields no value")),
        _ => Err(Error::type_error("expression leaves more than one value")),
    }
}

/// Which variables a program reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeededVariables {
    pub scalars: Vec<bool>,
    pub vectors: Vec<bool>,
}

impl NeededVariables {
    /// Scan a program's loads against the registry it was compiled for.
    pub fn scan(opcodes: &[Opcode], variables: &Variables) -> Self {
        let mut needed = Self {
            scalars: vec![false; variables.count(VariableKind::Scalar)],
            vectors: vec![false; variables.count(VariableKind::Vector)],
        };
        for op in opcodes {
            let Opcode::Load(operand) = op else {
                continue;
            };
            match variables.resolve_operand(*operand as usize) {
                Some((VariableKind::Scalar, i)) => needed.scalars[i] = true,
                Some((VariableKind::Vector, i)) => needed.vectors[i] = true,
                None => {}
            }
        }
        needed
    }

    pub fn get(&self, kind: VariableKind, index: usize) -> bool {
        let flags = match kind {
            VariableKind::Scalar => &self.scalars,
            VariableKind::Vector => &self.vectors,
        };
        flags.get(index).copied().unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.scalars.clear();
        self.vectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Opcode::*;

    fn vars() -> Variables {
        let mut vars = Variables::new();
        vars.set_scalar("s", 2.0);
        vars.set_scalar("t", 0.0);
        vars.set_vector("v", [1.0, 2.0, 3.0]);
        vars.set_vector("w", [0.0, 1.0, 0.0]);
        vars
    }

    fn resolve(mut ops: Vec<Opcode>) -> Result<(Vec<Opcode>, StackShape)> {
        let shape = disambiguate(&mut ops, &vars())?;
        Ok((ops, shape))
    }

    fn type_message(ops: Vec<Opcode>) -> String {
        match resolve(ops) {
            Err(Error::Type { message }) => message,
            other => panic!("expected type error, got {other:?}"),
        }
    }

    // operands: s = 0, t = 1, v = 2, w = 3

    #[test]
    fn test_scalar_arithmetic_resolves_to_scalar_ops() {
        let (ops, shape) = resolve(vec![Load(0), Load(1), GenericAdd, GenericNegate]).unwrap();
        assert_eq!(ops, vec![Load(0), Load(1), Add, Negate]);
        assert_eq!(shape, StackShape { max_slots: 2, result: Scalar });
    }

    #[test]
    fn test_vector_arithmetic_resolves_to_vector_ops() {
        let (ops, shape) = resolve(vec![Load(2), Load(3), GenericSubtract]).unwrap();
        assert_eq!(ops, vec![Load(2), Load(3), VectorSubtract]);
        assert_eq!(shape, StackShape { max_slots: 6, result: Vector });
    }

    #[test]
    fn test_mixed_multiply_and_divide() {
        let (ops, _) = resolve(vec![Load(0), Load(2), GenericMultiply]).unwrap();
        assert_eq!(ops[2], ScalarTimesVector);

        let (ops, _) = resolve(vec![Load(2), Load(0), GenericMultiply]).unwrap();
        assert_eq!(ops[2], VectorTimesScalar);

        let (ops, shape) = resolve(vec![Load(2), Load(0), GenericDivide]).unwrap();
        assert_eq!(ops[2], VectorOverScalar);
        assert_eq!(shape.result, Vector);
    }

    #[test]
    fn test_if_selects_by_branch_shape() {
        // if(s, v, w): w pushed first, condition last
        let (ops, shape) = resolve(vec![Load(3), Load(2), Load(0), GenericIf]).unwrap();
        assert_eq!(ops[3], VectorIf);
        assert_eq!(shape, StackShape { max_slots: 7, result: Vector });

        let (ops, _) = resolve(vec![Load(1), Load(0), Load(0), GenericIf]).unwrap();
        assert_eq!(ops[3], If);
    }

    #[test]
    fn test_shape_mismatches() {
        assert_eq!(
            type_message(vec![Load(0), Load(2), GenericAdd]),
            "addition expects either 2 vectors or 2 scalars"
        );
        assert_eq!(
            type_message(vec![Load(2), Load(0), GenericSubtract]),
            "subtraction expects either 2 vectors or 2 scalars"
        );
        assert_eq!(
            type_message(vec![Load(2), Load(3), GenericMultiply]),
            "multiply expects either 2 scalars or a scalar and a vector"
        );
        assert_eq!(
            type_message(vec![Load(0), Load(2), GenericDivide]),
            "can't divide by a vector"
        );
        assert_eq!(
            type_message(vec![Load(2), Immediate(0), Power]),
            "can't raise a vector to a power"
        );
        assert_eq!(
            type_message(vec![Load(2), Load(0), LessThan]),
            "vectors cannot be used in boolean expressions"
        );
        assert_eq!(
            type_message(vec![Load(2), Sin]),
            "sin expects a scalar, but got a vector"
        );
        assert_eq!(
            type_message(vec![Load(2), Load(0), Min]),
            "can't apply min to vectors"
        );
        assert_eq!(
            type_message(vec![Load(0), Load(1), Cross]),
            "can't apply cross to scalars"
        );
        assert_eq!(
            type_message(vec![Load(0), Load(1), Dot]),
            "dot product does not operate on scalars"
        );
        assert_eq!(
            type_message(vec![Load(0), Magnitude]),
            "magnitude expects a vector, but got a scalar"
        );
        assert_eq!(
            type_message(vec![Load(0), Normalize]),
            "normalize expects a vector, but got a scalar"
        );
        assert_eq!(
            type_message(vec![Load(0), Load(1), Load(2), GenericIf]),
            "the first argument of if cannot be a vector"
        );
        assert_eq!(
            type_message(vec![Load(2), Load(0), Load(1), GenericIf]),
            "the second and third arguments of if must be the same shape"
        );
    }

    #[test]
    fn test_malformed_programs() {
        assert_eq!(type_message(vec![]), "expression yields no value");
        assert_eq!(
            type_message(vec![Load(0), Load(1)]),
            "expression leaves more than one value"
        );
        assert_eq!(type_message(vec![GenericAdd]), "'add?' is missing an operand");
        assert_eq!(type_message(vec![Load(9)]), "operand #9 is not a variable");
    }

    #[test]
    fn test_needed_variables() {
        let vars = vars();
        let needed = NeededVariables::scan(&[Load(1), Load(3), Cross], &vars);
        assert_eq!(needed.scalars, vec![false, true]);
        assert_eq!(needed.vectors, vec![false, true]);
        assert!(needed.get(VariableKind::Vector, 1));
        assert!(!needed.get(VariableKind::Scalar, 7));
    }
}
