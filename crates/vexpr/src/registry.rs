//! Variable registry
//!
//! Two ordered, append-only tables of named scalars and 3-vectors. Insertion
//! order defines each variable's index. Compiled programs address variables
//! through a unified operand index space in which every scalar index comes
//! before every vector index.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Shape;

/// Which of the two variable tables a name lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Scalar,
    Vector,
}

impl VariableKind {
    pub fn shape(self) -> Shape {
        match self {
            VariableKind::Scalar => Shape::Scalar,
            VariableKind::Vector => Shape::Vector,
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Scalar => f.write_str("scalar"),
            VariableKind::Vector => f.write_str("vector"),
        }
    }
}

/// Outcome of a set operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Name existed with the same value; nothing happened.
    Unchanged,
    /// Name existed and its value was replaced.
    Updated,
    /// Name was new and has been appended, shifting the vector index space.
    Appended,
}

impl Change {
    pub fn is_modified(self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// A variable reference resolved against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandMatch {
    /// Unified operand index (scalars first, then vectors)
    pub operand: usize,
    /// Byte length of the matched name
    pub len: usize,
}

/// Named scalar and vector variables
#[derive(Debug, Clone, Default)]
pub struct Variables {
    scalars: IndexMap<String, f64>,
    vectors: IndexMap<String, [f64; 3]>,
    /// Bumped whenever the operand index space changes.
    layout: u64,
}

/// Strip spaces from a user supplied variable name.
///
/// Formulas are matched with whitespace removed, so names are normalized the
/// same way before they are stored or looked up.
pub fn clean_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, name: &str, value: f64) -> Change {
        let name = clean_name(name);
        if let Some(slot) = self.scalars.get_mut(&name) {
            if *slot != value {
                *slot = value;
                return Change::Updated;
            }
            return Change::Unchanged;
        }
        self.scalars.insert(name, value);
        self.layout += 1;
        Change::Appended
    }

    pub fn set_scalar_at(&mut self, index: usize, value: f64) -> Result<Change> {
        let count = self.scalars.len();
        let (_, slot) = self
            .scalars
            .get_index_mut(index)
            .ok_or(Error::VariableIndex {
                kind: VariableKind::Scalar,
                index,
                count,
            })?;
        if *slot != value {
            *slot = value;
            return Ok(Change::Updated);
        }
        Ok(Change::Unchanged)
    }

    pub fn set_vector(&mut self, name: &str, value: [f64; 3]) -> Change {
        let name = clean_name(name);
        if let Some(slot) = self.vectors.get_mut(&name) {
            if *slot != value {
                *slot = value;
                return Change::Updated;
            }
            return Change::Unchanged;
        }
        self.vectors.insert(name, value);
        self.layout += 1;
        Change::Appended
    }

    pub fn set_vector_at(&mut self, index: usize, value: [f64; 3]) -> Result<Change> {
        let count = self.vectors.len();
        let (_, slot) = self
            .vectors
            .get_index_mut(index)
            .ok_or(Error::VariableIndex {
                kind: VariableKind::Vector,
                index,
                count,
            })?;
        if *slot != value {
            *slot = value;
            return Ok(Change::Updated);
        }
        Ok(Change::Unchanged)
    }

    pub fn scalar(&self, name: &str) -> Result<f64> {
        let name = clean_name(name);
        self.scalars
            .get(&name)
            .copied()
            .ok_or(Error::UnknownVariable {
                kind: VariableKind::Scalar,
                name,
            })
    }

    pub fn scalar_at(&self, index: usize) -> Result<f64> {
        self.scalars
            .get_index(index)
            .map(|(_, v)| *v)
            .ok_or(Error::VariableIndex {
                kind: VariableKind::Scalar,
                index,
                count: self.scalars.len(),
            })
    }

    pub fn vector(&self, name: &str) -> Result<[f64; 3]> {
        let name = clean_name(name);
        self.vectors
            .get(&name)
            .copied()
            .ok_or(Error::UnknownVariable {
                kind: VariableKind::Vector,
                name,
            })
    }

    pub fn vector_at(&self, index: usize) -> Result<[f64; 3]> {
        self.vectors
            .get_index(index)
            .map(|(_, v)| *v)
            .ok_or(Error::VariableIndex {
                kind: VariableKind::Vector,
                index,
                count: self.vectors.len(),
            })
    }

    /// Remove every scalar variable. Returns whether anything was removed.
    pub fn remove_scalars(&mut self) -> bool {
        if self.scalars.is_empty() {
            return false;
        }
        self.scalars.clear();
        self.layout += 1;
        true
    }

    /// Remove every vector variable. Returns whether anything was removed.
    pub fn remove_vectors(&mut self) -> bool {
        if self.vectors.is_empty() {
            return false;
        }
        self.vectors.clear();
        self.layout += 1;
        true
    }

    pub fn remove_all(&mut self) -> bool {
        let scalars = self.remove_scalars();
        let vectors = self.remove_vectors();
        scalars || vectors
    }

    pub fn count(&self, kind: VariableKind) -> usize {
        match kind {
            VariableKind::Scalar => self.scalars.len(),
            VariableKind::Vector => self.vectors.len(),
        }
    }

    pub fn name_at(&self, kind: VariableKind, index: usize) -> Option<&str> {
        match kind {
            VariableKind::Scalar => self.scalars.get_index(index).map(|(k, _)| k.as_str()),
            VariableKind::Vector => self.vectors.get_index(index).map(|(k, _)| k.as_str()),
        }
    }

    pub fn index_of(&self, kind: VariableKind, name: &str) -> Option<usize> {
        let name = clean_name(name);
        match kind {
            VariableKind::Scalar => self.scalars.get_index_of(&name),
            VariableKind::Vector => self.vectors.get_index_of(&name),
        }
    }

    /// Current layout version; changes whenever a name is appended or removed.
    pub fn layout(&self) -> u64 {
        self.layout
    }

    /// Total size of the unified operand index space
    pub fn operand_count(&self) -> usize {
        self.scalars.len() + self.vectors.len()
    }

    /// Split a unified operand index into its table and local index.
    pub fn resolve_operand(&self, operand: usize) -> Option<(VariableKind, usize)> {
        let scalars = self.scalars.len();
        if operand < scalars {
            Some((VariableKind::Scalar, operand))
        } else if operand - scalars < self.vectors.len() {
            Some((VariableKind::Vector, operand - scalars))
        } else {
            None
        }
    }

    /// Iterate over every name in operand-index order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scalars
            .keys()
            .chain(self.vectors.keys())
            .map(String::as_str)
    }

    /// Longest variable name that prefixes `text`.
    ///
    /// One name may be a textual prefix of another (`x` vs `x1`), so every
    /// candidate is tried and the longest wins. On equal length a scalar wins
    /// over a vector.
    pub fn longest_match(&self, text: &[u8]) -> Option<OperandMatch> {
        let mut best: Option<OperandMatch> = None;
        for (operand, name) in self.names().enumerate() {
            if name.is_empty() || !text.starts_with(name.as_bytes()) {
                continue;
            }
            if best.is_none_or(|b| name.len() > b.len) {
                best = Some(OperandMatch {
                    operand,
                    len: name.len(),
                });
            }
        }
        best
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scalars.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn vectors(&self) -> impl Iterator<Item = (&str, [f64; 3])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Scalar value by local index, for the executor's hot path.
    pub(crate) fn scalar_slot(&self, index: usize) -> Option<f64> {
        self.scalars.get_index(index).map(|(_, v)| *v)
    }

    pub(crate) fn vector_slot(&self, index: usize) -> Option<[f64; 3]> {
        self.vectors.get_index(index).map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_appends_then_updates() {
        let mut vars = Variables::new();
        assert_eq!(vars.set_scalar("x", 1.0), Change::Appended);
        assert_eq!(vars.set_scalar("x", 1.0), Change::Unchanged);
        assert_eq!(vars.set_scalar("x", 2.0), Change::Updated);
        assert_eq!(vars.scalar("x"), Ok(2.0));
        assert_eq!(vars.count(VariableKind::Scalar), 1);
    }

    #[test]
    fn test_layout_only_moves_on_append_and_remove() {
        let mut vars = Variables::new();
        let start = vars.layout();
        vars.set_scalar("a", 1.0);
        let after_append = vars.layout();
        assert!(after_append > start);

        vars.set_scalar("a", 5.0);
        vars.set_vector("v", [1.0, 2.0, 3.0]);
        let after_vector = vars.layout();
        assert!(after_vector > after_append);

        vars.set_vector("v", [0.0, 0.0, 0.0]);
        assert_eq!(vars.layout(), after_vector);

        assert!(vars.remove_vectors());
        assert!(vars.layout() > after_vector);
        assert!(!vars.remove_vectors());
    }

    #[test]
    fn test_names_are_stripped_of_spaces() {
        let mut vars = Variables::new();
        vars.set_scalar(" my var ", 3.0);
        assert_eq!(vars.name_at(VariableKind::Scalar, 0), Some("myvar"));
        assert_eq!(vars.scalar("myvar"), Ok(3.0));
        assert_eq!(vars.scalar("my var"), Ok(3.0));
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let vars = Variables::new();
        assert!(matches!(
            vars.scalar("nope"),
            Err(Error::UnknownVariable {
                kind: VariableKind::Scalar,
                ..
            })
        ));
        assert!(matches!(
            vars.vector_at(2),
            Err(Error::VariableIndex {
                kind: VariableKind::Vector,
                index: 2,
                count: 0
            })
        ));
    }

    #[test]
    fn test_unified_operand_space_puts_scalars_first() {
        let mut vars = Variables::new();
        vars.set_vector("v", [1.0, 0.0, 0.0]);
        vars.set_scalar("s", 2.0);
        vars.set_scalar("t", 3.0);

        assert_eq!(vars.resolve_operand(0), Some((VariableKind::Scalar, 0)));
        assert_eq!(vars.resolve_operand(1), Some((VariableKind::Scalar, 1)));
        assert_eq!(vars.resolve_operand(2), Some((VariableKind::Vector, 0)));
        assert_eq!(vars.resolve_operand(3), None);
    }

    #[test]
    fn test_longest_match_prefers_longer_name() {
        let mut vars = Variables::new();
        vars.set_scalar("x", 1.0);
        vars.set_vector("x1", [0.0; 3]);

        let m = vars.longest_match(b"x1+2").unwrap();
        assert_eq!(m, OperandMatch { operand: 1, len: 2 });

        let m = vars.longest_match(b"x+2").unwrap();
        assert_eq!(m, OperandMatch { operand: 0, len: 1 });

        assert!(vars.longest_match(b"y").is_none());
    }
}
