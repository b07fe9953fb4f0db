//! Vexpr Tools
//!
//! CLI tools for compiling and evaluating vexpr formulas.

use std::fmt::Write;

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` environment variable to override the default filter.
/// Default is `info` for vexpr crates and `warn` for others.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,vexpr=info,vexpr_tools=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Split a `name=value` argument.
pub fn parse_scalar_assignment(arg: &str) -> Result<(String, f64), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{arg}'"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for '{name}': {e}"))?;
    Ok((name.to_string(), value))
}

/// Split a `name=x,y,z` argument.
pub fn parse_vector_assignment(arg: &str) -> Result<(String, [f64; 3]), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=x,y,z, got '{arg}'"))?;
    let components = value
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad component for '{name}': {e}"))?;
    let &[x, y, z] = components.as_slice() else {
        return Err(format!(
            "vector '{name}' needs 3 components, got {}",
            components.len()
        ));
    };
    Ok((name.to_string(), [x, y, z]))
}

/// The formula with a caret under character `position`.
pub fn point_at(formula: &str, position: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {formula}");
    let _ = write!(out, "  {}^", " ".repeat(position));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_assignment() {
        assert_eq!(parse_scalar_assignment("x=2.5"), Ok(("x".to_string(), 2.5)));
        assert_eq!(
            parse_scalar_assignment("my var = -1"),
            Ok(("my var ".to_string(), -1.0))
        );
        assert!(parse_scalar_assignment("x").is_err());
        assert!(parse_scalar_assignment("x=abc").is_err());
    }

    #[test]
    fn test_vector_assignment() {
        assert_eq!(
            parse_vector_assignment("v=1,2,3"),
            Ok(("v".to_string(), [1.0, 2.0, 3.0]))
        );
        assert!(parse_vector_assignment("v=1,2").is_err());
        assert!(parse_vector_assignment("v=1,2,3,4").is_err());
    }

    #[test]
    fn test_point_at() {
        assert_eq!(point_at("x + )", 4), "  x + )\n      ^");
    }
}
