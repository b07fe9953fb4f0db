//! Built-in functions and named constants
//!
//! The set is closed: a name is only a function call when it is immediately
//! followed by `(`, which keeps variables such as `absolutex` from being read
//! as `abs` applied to something.

use crate::bytecode::Opcode;

/// A built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    /// Instruction emitted after the arguments
    pub opcode: Opcode,
    /// Number of comma separated arguments
    pub arity: usize,
    /// Still accepted, but warned about
    pub deprecated: bool,
}

const fn unary(name: &'static str, opcode: Opcode) -> Builtin {
    Builtin {
        name,
        opcode,
        arity: 1,
        deprecated: false,
    }
}

const fn binary(name: &'static str, opcode: Opcode) -> Builtin {
    Builtin {
        name,
        opcode,
        arity: 2,
        deprecated: false,
    }
}

pub const BUILTINS: &[Builtin] = &[
    unary("abs", Opcode::Abs),
    unary("exp", Opcode::Exp),
    unary("ceil", Opcode::Ceil),
    unary("floor", Opcode::Floor),
    unary("ln", Opcode::Ln),
    unary("log10", Opcode::Log10),
    Builtin {
        name: "log",
        opcode: Opcode::Log,
        arity: 1,
        deprecated: true,
    },
    unary("sqrt", Opcode::Sqrt),
    unary("sin", Opcode::Sin),
    unary("sinh", Opcode::Sinh),
    unary("cos", Opcode::Cos),
    unary("cosh", Opcode::Cosh),
    unary("tan", Opcode::Tan),
    unary("tanh", Opcode::Tanh),
    unary("asin", Opcode::Asin),
    unary("acos", Opcode::Acos),
    unary("atan", Opcode::Atan),
    binary("min", Opcode::Min),
    binary("max", Opcode::Max),
    binary("cross", Opcode::Cross),
    binary("dot", Opcode::Dot),
    unary("sign", Opcode::Sign),
    unary("mag", Opcode::Magnitude),
    unary("norm", Opcode::Normalize),
    Builtin {
        name: "if",
        opcode: Opcode::GenericIf,
        arity: 3,
        deprecated: false,
    },
];

/// Named vector constants
pub const CONSTANTS: &[(&str, Opcode)] = &[
    ("iHat", Opcode::IHat),
    ("jHat", Opcode::JHat),
    ("kHat", Opcode::KHat),
];

/// Function whose name, followed by `(`, starts `text`.
pub fn match_call(text: &[u8]) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| {
        text.starts_with(b.name.as_bytes()) && text.get(b.name.len()) == Some(&b'(')
    })
}

/// Named constant starting `text`, with its length.
pub fn match_constant(text: &[u8]) -> Option<(Opcode, usize)> {
    CONSTANTS
        .iter()
        .find(|(name, _)| text.starts_with(name.as_bytes()))
        .map(|(name, op)| (*op, name.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_requires_parenthesis() {
        assert_eq!(match_call(b"abs(x)").map(|b| b.name), Some("abs"));
        assert!(match_call(b"absolutex").is_none());
        assert!(match_call(b"abs").is_none());
    }

    #[test]
    fn test_similar_names_resolve_distinctly() {
        assert_eq!(match_call(b"sinh(1)").map(|b| b.opcode), Some(Opcode::Sinh));
        assert_eq!(match_call(b"sin(1)").map(|b| b.opcode), Some(Opcode::Sin));
        assert_eq!(match_call(b"log10(1)").map(|b| b.opcode), Some(Opcode::Log10));
        assert_eq!(match_call(b"log(1)").map(|b| b.opcode), Some(Opcode::Log));
        assert_eq!(match_call(b"asin(1)").map(|b| b.opcode), Some(Opcode::Asin));
    }

    #[test]
    fn test_arity_table() {
        for name in ["min", "max", "cross", "dot"] {
            let b = BUILTINS.iter().find(|b| b.name == name).unwrap();
            assert_eq!(b.arity, 2, "{name}");
        }
        let b = BUILTINS.iter().find(|b| b.name == "if").unwrap();
        assert_eq!(b.arity, 3);
    }

    #[test]
    fn test_constants() {
        assert_eq!(match_constant(b"jHat*2"), Some((Opcode::JHat, 4)));
        assert_eq!(match_constant(b"jhat"), None);
    }
}
