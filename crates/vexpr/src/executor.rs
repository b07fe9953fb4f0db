//! Bytecode executor
//!
//! Stack machine over flat `f64` slots. A vector occupies three consecutive
//! slots with `x` deepest, so a vector on top of the stack is
//! `[top - 3, top - 2, top - 1]`.

use crate::bytecode::{Opcode, Program};
use crate::config::EvalConfig;
use crate::error::{Error, Result};
use crate::registry::{VariableKind, Variables};
use crate::value::Value;

/// Evaluation stack, sized once per compiled program and reused
#[derive(Debug, Clone, Default)]
pub struct EvalStack {
    slots: Vec<f64>,
    top: usize,
}

impl EvalStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the stack and make room for `size` slots.
    pub fn reset(&mut self, size: usize) {
        if self.slots.len() < size {
            self.slots.resize(size, 0.0);
        }
        self.top = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn depth(&self) -> usize {
        self.top
    }

    fn push(&mut self, value: f64) {
        self.slots[self.top] = value;
        self.top += 1;
    }

    fn pop(&mut self) -> f64 {
        self.top = self.top.checked_sub(1).expect("vm bug: stack underflow");
        self.slots[self.top]
    }

    fn push_vector(&mut self, [x, y, z]: [f64; 3]) {
        self.push(x);
        self.push(y);
        self.push(z);
    }

    fn pop_vector(&mut self) -> [f64; 3] {
        let z = self.pop();
        let y = self.pop();
        let x = self.pop();
        [x, y, z]
    }
}

/// Outcome of an argument outside an operation's domain
fn out_of_domain(
    config: &EvalConfig,
    operation: &'static str,
    message: impl FnOnce() -> String,
) -> Result<f64> {
    if config.replace_invalid {
        Ok(config.replacement_value)
    } else {
        Err(Error::Domain {
            operation,
            message: message(),
        })
    }
}

fn logarithm(
    config: &EvalConfig,
    operation: &'static str,
    x: f64,
    log: impl FnOnce(f64) -> f64,
) -> Result<f64> {
    if x <= 0.0 {
        out_of_domain(config, operation, || {
            format!("trying to take a logarithm of a non-positive value {x}")
        })
    } else {
        Ok(log(x))
    }
}

fn inverse_trig(
    config: &EvalConfig,
    operation: &'static str,
    x: f64,
    f: impl FnOnce(f64) -> f64,
) -> Result<f64> {
    if !(-1.0..=1.0).contains(&x) && !x.is_nan() {
        out_of_domain(config, operation, || {
            format!("the argument {x} is outside [-1, 1]")
        })
    } else {
        Ok(f(x))
    }
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else if x == 0.0 {
        0.0
    } else {
        1.0
    }
}

fn magnitude([x, y, z]: [f64; 3]) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Run a resolved program against the current variable values.
///
/// The program must have been compiled against the same registry layout as
/// `variables`; operand indices are not translated.
pub fn execute(
    program: &Program,
    variables: &Variables,
    config: &EvalConfig,
    stack: &mut EvalStack,
) -> Result<Value> {
    use Opcode::*;

    stack.reset(program.stack_size);

    for op in &program.opcodes {
        match *op {
            Immediate(idx) => stack.push(program.immediates[idx as usize]),
            Load(operand) => {
                let operand = operand as usize;
                let missing = || Error::VariableIndex {
                    kind: VariableKind::Vector,
                    index: operand,
                    count: variables.operand_count(),
                };
                match variables.resolve_operand(operand).ok_or_else(missing)? {
                    (VariableKind::Scalar, i) => {
                        stack.push(variables.scalar_slot(i).ok_or_else(missing)?)
                    }
                    (VariableKind::Vector, i) => {
                        stack.push_vector(variables.vector_slot(i).ok_or_else(missing)?)
                    }
                }
            }
            IHat => stack.push_vector([1.0, 0.0, 0.0]),
            JHat => stack.push_vector([0.0, 1.0, 0.0]),
            KHat => stack.push_vector([0.0, 0.0, 1.0]),

            GenericNegate | GenericPlus | GenericAdd | GenericSubtract | GenericMultiply
            | GenericDivide | GenericIf => {
                unreachable!("vm bug: unresolved instruction {op:?}")
            }

            Negate => {
                let a = stack.pop();
                stack.push(-a);
            }
            Plus | VectorPlus => {}
            Add => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(a + b);
            }
            Subtract => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(a - b);
            }
            Multiply => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(a * b);
            }
            Divide => {
                let b = stack.pop();
                let a = stack.pop();
                let quotient = if b == 0.0 {
                    out_of_domain(config, "divide", || "trying to divide by zero".to_string())?
                } else {
                    a / b
                };
                stack.push(quotient);
            }
            Power => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(a.powf(b));
            }

            VectorNegate => {
                let [x, y, z] = stack.pop_vector();
                stack.push_vector([-x, -y, -z]);
            }
            VectorAdd => {
                let b = stack.pop_vector();
                let a = stack.pop_vector();
                stack.push_vector([a[0] + b[0], a[1] + b[1], a[2] + b[2]]);
            }
            VectorSubtract => {
                let b = stack.pop_vector();
                let a = stack.pop_vector();
                stack.push_vector([a[0] - b[0], a[1] - b[1], a[2] - b[2]]);
            }
            ScalarTimesVector => {
                let [x, y, z] = stack.pop_vector();
                let s = stack.pop();
                stack.push_vector([s * x, s * y, s * z]);
            }
            VectorTimesScalar => {
                let s = stack.pop();
                let [x, y, z] = stack.pop_vector();
                stack.push_vector([x * s, y * s, z * s]);
            }
            VectorOverScalar => {
                let s = stack.pop();
                let [x, y, z] = stack.pop_vector();
                if s == 0.0 {
                    let r = out_of_domain(config, "divide", || {
                        "trying to divide a vector by zero".to_string()
                    })?;
                    stack.push_vector([r; 3]);
                } else {
                    stack.push_vector([x / s, y / s, z / s]);
                }
            }
            Dot => {
                let b = stack.pop_vector();
                let a = stack.pop_vector();
                stack.push(a[0] * b[0] + a[1] * b[1] + a[2] * b[2]);
            }
            Cross => {
                let b = stack.pop_vector();
                let a = stack.pop_vector();
                stack.push_vector([
                    a[1] * b[2] - a[2] * b[1],
                    a[2] * b[0] - a[0] * b[2],
                    a[0] * b[1] - a[1] * b[0],
                ]);
            }
            Magnitude => {
                let v = stack.pop_vector();
                stack.push(magnitude(v));
            }
            Normalize => {
                let v = stack.pop_vector();
                let m = magnitude(v);
                if m == 0.0 {
                    stack.push_vector(v);
                } else {
                    stack.push_vector([v[0] / m, v[1] / m, v[2] / m]);
                }
            }

            Abs | Exp | Ceil | Floor | Log | Ln | Log10 | Sqrt | Sin | Cos | Tan | Asin | Acos
            | Atan | Sinh | Cosh | Tanh | Sign => {
                let x = stack.pop();
                let r = match *op {
                    Abs => x.abs(),
                    Exp => x.exp(),
                    Ceil => x.ceil(),
                    Floor => x.floor(),
                    Log => logarithm(config, "log", x, f64::ln)?,
                    Ln => logarithm(config, "ln", x, f64::ln)?,
                    Log10 => logarithm(config, "log10", x, f64::log10)?,
                    Sqrt if x < 0.0 => out_of_domain(config, "sqrt", || {
                        format!("trying to take a square root of a negative value {x}")
                    })?,
                    Sqrt => x.sqrt(),
                    Sin => x.sin(),
                    Cos => x.cos(),
                    Tan => x.tan(),
                    Asin => inverse_trig(config, "asin", x, f64::asin)?,
                    Acos => inverse_trig(config, "acos", x, f64::acos)?,
                    Atan => x.atan(),
                    Sinh => x.sinh(),
                    Cosh => x.cosh(),
                    Tanh => x.tanh(),
                    _ => sign(x),
                };
                stack.push(r);
            }
            Min => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(if b < a { b } else { a });
            }
            Max => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(if b > a { b } else { a });
            }

            LessThan => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(truth(a < b));
            }
            GreaterThan => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(truth(a > b));
            }
            EqualTo => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(truth(a == b));
            }
            And => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(truth(a != 0.0 && b != 0.0));
            }
            Or => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(truth(a != 0.0 || b != 0.0));
            }

            If => {
                let condition = stack.pop();
                let when_true = stack.pop();
                let when_false = stack.pop();
                stack.push(if condition != 0.0 { when_true } else { when_false });
            }
            VectorIf => {
                let condition = stack.pop();
                let when_true = stack.pop_vector();
                let when_false = stack.pop_vector();
                stack.push_vector(if condition != 0.0 { when_true } else { when_false });
            }
        }
    }

    match stack.depth() {
        1 => Ok(Value::Scalar(stack.pop())),
        3 => Ok(Value::Vector(stack.pop_vector())),
        depth => unreachable!("vm bug: {depth} slots left after execution"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Shape;
    use Opcode::*;

    fn program(opcodes: Vec<Opcode>, immediates: Vec<f64>, stack_size: usize) -> Program {
        // the executor never looks at the declared result shape
        Program {
            opcodes,
            immediates,
            stack_size,
            result: Shape::Scalar,
            layout: 0,
        }
    }

    fn vars() -> Variables {
        let mut vars = Variables::new();
        vars.set_scalar("s", 2.0);
        vars.set_scalar("zero", 0.0);
        vars.set_vector("v", [1.0, 2.0, 3.0]);
        vars
    }

    fn run(opcodes: Vec<Opcode>, immediates: Vec<f64>, config: EvalConfig) -> Result<Value> {
        let mut stack = EvalStack::new();
        execute(&program(opcodes, immediates, 16), &vars(), &config, &mut stack)
    }

    fn strict(opcodes: Vec<Opcode>, immediates: Vec<f64>) -> Result<Value> {
        run(opcodes, immediates, EvalConfig::default())
    }

    #[test]
    fn test_scalar_arithmetic() {
        // (2 + 3) * s
        let value = strict(
            vec![Immediate(0), Immediate(1), Add, Load(0), Multiply],
            vec![2.0, 3.0],
        );
        assert_eq!(value, Ok(Value::Scalar(10.0)));
    }

    #[test]
    fn test_vector_loads_keep_component_order() {
        let value = strict(vec![Load(2)], vec![]);
        assert_eq!(value, Ok(Value::Vector([1.0, 2.0, 3.0])));
    }

    #[test]
    fn test_scalar_times_vector_and_back() {
        assert_eq!(
            strict(vec![Load(0), Load(2), ScalarTimesVector], vec![]),
            Ok(Value::Vector([2.0, 4.0, 6.0]))
        );
        assert_eq!(
            strict(vec![Load(2), Load(0), VectorTimesScalar], vec![]),
            Ok(Value::Vector([2.0, 4.0, 6.0]))
        );
        assert_eq!(
            strict(vec![Load(2), Load(0), VectorOverScalar], vec![]),
            Ok(Value::Vector([0.5, 1.0, 1.5]))
        );
    }

    #[test]
    fn test_cross_and_dot() {
        assert_eq!(
            strict(vec![IHat, JHat, Cross], vec![]),
            Ok(Value::Vector([0.0, 0.0, 1.0]))
        );
        assert_eq!(
            strict(vec![Load(2), Load(2), Dot], vec![]),
            Ok(Value::Scalar(14.0))
        );
    }

    #[test]
    fn test_normalize_zero_vector_is_unchanged() {
        assert_eq!(
            strict(vec![Load(1), Load(2), ScalarTimesVector, Normalize], vec![]),
            Ok(Value::Vector([0.0, 0.0, 0.0]))
        );
    }

    #[test]
    fn test_sign_and_min_max() {
        assert_eq!(strict(vec![Immediate(0), Sign], vec![-4.0]), Ok(Value::Scalar(-1.0)));
        assert_eq!(strict(vec![Load(1), Sign], vec![]), Ok(Value::Scalar(0.0)));
        assert_eq!(
            strict(vec![Immediate(0), Load(0), Min], vec![5.0]),
            Ok(Value::Scalar(2.0))
        );
        assert_eq!(
            strict(vec![Immediate(0), Load(0), Max], vec![5.0]),
            Ok(Value::Scalar(5.0))
        );
    }

    #[test]
    fn test_if_takes_condition_from_top() {
        // if(s, 10, 20): 20 pushed first, then 10, then the condition
        let value = strict(
            vec![Immediate(0), Immediate(1), Load(0), If],
            vec![20.0, 10.0],
        );
        assert_eq!(value, Ok(Value::Scalar(10.0)));

        let value = strict(vec![IHat, JHat, Load(1), VectorIf], vec![]);
        assert_eq!(value, Ok(Value::Vector([1.0, 0.0, 0.0])));
    }

    #[test]
    fn test_domain_errors_abort_without_replacement() {
        let err = strict(vec![Load(0), Load(1), Divide], vec![]).unwrap_err();
        assert!(matches!(err, Error::Domain { operation: "divide", .. }));

        let err = strict(vec![Load(1), Ln], vec![]).unwrap_err();
        assert!(matches!(err, Error::Domain { operation: "ln", .. }));

        let err = strict(vec![Immediate(0), Sqrt], vec![-1.0]).unwrap_err();
        assert!(matches!(err, Error::Domain { operation: "sqrt", .. }));

        let err = strict(vec![Immediate(0), Acos], vec![1.5]).unwrap_err();
        assert!(matches!(err, Error::Domain { operation: "acos", .. }));
    }

    #[test]
    fn test_domain_errors_substitute_with_replacement() {
        let config = EvalConfig::replacing_with(1234.5);
        assert_eq!(
            run(vec![Load(0), Load(1), Divide], vec![], config),
            Ok(Value::Scalar(1234.5))
        );
        assert_eq!(
            run(vec![Load(2), Load(1), VectorOverScalar], vec![], config),
            Ok(Value::Vector([1234.5; 3]))
        );
        // the replacement feeds into the rest of the program
        assert_eq!(
            run(vec![Load(1), Log10, Immediate(0), Add], vec![0.5], config),
            Ok(Value::Scalar(1235.0))
        );
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            strict(vec![Load(0), Load(1), Or], vec![]),
            Ok(Value::Scalar(1.0))
        );
        assert_eq!(
            strict(vec![Load(0), Load(1), And], vec![]),
            Ok(Value::Scalar(0.0))
        );
        assert_eq!(
            strict(vec![Load(0), Immediate(0), EqualTo], vec![2.0]),
            Ok(Value::Scalar(1.0))
        );
    }

    #[test]
    fn test_stack_is_reused() {
        let program = program(vec![Load(0), Load(0), Multiply], vec![], 2);
        let mut stack = EvalStack::new();
        let vars = vars();
        let config = EvalConfig::default();
        for _ in 0..3 {
            assert_eq!(
                execute(&program, &vars, &config, &mut stack),
                Ok(Value::Scalar(4.0))
            );
        }
        assert_eq!(stack.capacity(), 2);
        assert_eq!(stack.depth(), 0);
    }
}
