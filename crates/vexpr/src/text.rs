//! Formula text handling
//!
//! Validation and code generation both run over a whitespace-free copy of the
//! formula, indexed by byte. Errors are reported against the text as the user
//! typed it, so the stripped copy remembers where each of its bytes came from.

use crate::functions;
use crate::registry::Variables;

/// Operator characters, lowest precedence class first
pub const OPERATOR_CHARS: &[u8] = b"|&=<>+-.*/^";

/// A formula in both its supplied and its whitespace-free form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    original: String,
    stripped: String,
    /// Byte offset in `original` of each byte of `stripped`, plus one entry
    /// for the end of the stripped text.
    origin: Vec<usize>,
}

impl Formula {
    pub fn new(original: &str) -> Self {
        let mut stripped = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        let mut end = 0;
        for (offset, c) in original.char_indices() {
            if c.is_whitespace() {
                continue;
            }
            stripped.push(c);
            origin.extend(std::iter::repeat_n(offset, c.len_utf8()));
            end = offset + c.len_utf8();
        }
        origin.push(end);
        Self {
            original: original.to_string(),
            stripped,
            origin,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn stripped(&self) -> &str {
        &self.stripped
    }

    pub fn bytes(&self) -> &[u8] {
        self.stripped.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.stripped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stripped.is_empty()
    }

    /// Character index in the original text of stripped byte `pos`.
    ///
    /// Positions at or past the end of the stripped text map to just after
    /// its last character; trailing whitespace is not counted.
    pub fn original_position(&self, pos: usize) -> usize {
        let byte = self.origin[pos.min(self.origin.len() - 1)];
        self.original[..byte].chars().count()
    }
}

/// End of the numeric literal starting at `start`, if there is one.
///
/// Accepts `digits[.digits][e[+-]digits]` and `.digits[...]`. An exponent
/// marker without digits after it is not consumed.
pub fn scan_number(text: &[u8], start: usize) -> Option<usize> {
    let digits_from = |mut i: usize| {
        while i < text.len() && text[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = digits_from(start);
    let mut seen_digit = i > start;
    if text.get(i) == Some(&b'.') {
        let after = digits_from(i + 1);
        seen_digit |= after > i + 1;
        i = after;
    }
    if !seen_digit {
        return None;
    }

    if matches!(text.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(text.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let end = digits_from(j);
        if end > j {
            i = end;
        }
    }
    Some(i)
}

/// Value of the literal starting at `start`.
pub fn parse_number(text: &[u8], start: usize) -> Option<f64> {
    let end = scan_number(text, start)?;
    std::str::from_utf8(&text[start..end]).ok()?.parse().ok()
}

/// Whether `text[start..]` begins a numeric literal.
pub fn starts_number(text: &[u8], start: usize) -> bool {
    match text.get(start) {
        Some(c) if c.is_ascii_digit() => true,
        Some(b'.') => text.get(start + 1).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

/// Marks the bytes of every variable name the operand scan matches.
///
/// Variable names may contain operator characters; those characters must not
/// be taken as operators when the compiler splits a range. Only names matched
/// where an operand starts count, so `xa-b` with variables `xa`, `a-b` and `b`
/// leaves the `-` unmasked. Expects text that has passed validation.
pub fn variable_mask(text: &[u8], variables: &Variables) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let mut i = 0;
    let mut expect_operand = true;
    while i < text.len() {
        if !expect_operand {
            // a closing parenthesis keeps us after an operand; a comma or an
            // operator starts the next one
            if text[i] != b')' {
                expect_operand = true;
            }
            i += 1;
            continue;
        }

        if matches!(text[i], b'-' | b'+' | b'(') {
            i += 1;
            continue;
        }

        let rest = &text[i..];
        if let Some(builtin) = functions::match_call(rest) {
            i += builtin.name.len() + 1;
            continue;
        }

        let len = if starts_number(text, i) {
            scan_number(text, i).map_or(1, |end| end - i)
        } else if let Some((_, len)) = functions::match_constant(rest) {
            len
        } else if let Some(found) = variables.longest_match(rest) {
            mask[i..i + found.len].fill(true);
            found.len
        } else {
            1
        };
        i += len.max(1);
        expect_operand = false;
    }
    mask
}
