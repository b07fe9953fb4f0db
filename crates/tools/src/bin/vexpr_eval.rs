//! Evaluate a formula once from the command line.
//!
//! Usage: `vexpr-eval <formula> [-s name=value]... [-v name=x,y,z]...`

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde_json::json;
use tracing::{debug, error};
use vexpr::{Error, EvalConfig, FunctionParser, Value};
use vexpr_tools::{parse_scalar_assignment, parse_vector_assignment, point_at};

#[derive(Parser, Debug)]
#[command(name = "vexpr-eval")]
#[command(about = "Compile and evaluate a scalar/vector formula")]
struct Args {
    /// Formula to evaluate, e.g. "mag(cross(a, b)) * s"
    formula: String,

    /// Scalar variable as name=value (repeatable)
    #[arg(short = 's', long = "scalar", value_parser = parse_scalar_assignment)]
    scalars: Vec<(String, f64)>,

    /// Vector variable as name=x,y,z (repeatable)
    #[arg(short = 'v', long = "vector", value_parser = parse_vector_assignment)]
    vectors: Vec<(String, [f64; 3])>,

    /// JSON file with evaluation settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace out-of-domain results instead of failing
    #[arg(long)]
    replace_invalid: bool,

    /// Value substituted for out-of-domain results
    #[arg(long)]
    replacement_value: Option<f64>,

    /// Print the compiled program
    #[arg(long)]
    disassemble: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<EvalConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("invalid config '{}': {e}", path.display()))?
        }
        None => EvalConfig::default(),
    };
    if args.replace_invalid {
        config.replace_invalid = true;
    }
    if let Some(value) = args.replacement_value {
        config.replacement_value = value;
    }
    Ok(config)
}

fn report(formula: &str, err: &Error) {
    match err {
        Error::Syntax { position, .. } => error!("{err}\n{}", point_at(formula, *position)),
        _ => error!("{err}"),
    }
}

fn main() {
    vexpr_tools::init_logging();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(message) => {
            error!("{message}");
            process::exit(1);
        }
    };
    debug!(?config, "evaluation settings");

    let mut parser = FunctionParser::new();
    parser.set_config(config);
    for (name, value) in &args.scalars {
        parser.set_scalar_variable(name, *value);
    }
    for (name, [x, y, z]) in &args.vectors {
        parser.set_vector_variable(name, *x, *y, *z);
    }
    parser.set_function(Some(&args.formula));

    let value = match parser.evaluate() {
        Ok(value) => value,
        Err(err) => {
            report(&args.formula, &err);
            process::exit(1);
        }
    };

    if args.disassemble {
        if let Some(program) = parser.program() {
            print!("{program}");
        }
    }

    if args.json {
        let needed_scalars: Vec<&str> = parser
            .variables()
            .scalars()
            .map(|(name, _)| name)
            .filter(|name| parser.scalar_variable_needed(name))
            .collect();
        let needed_vectors: Vec<&str> = parser
            .variables()
            .vectors()
            .map(|(name, _)| name)
            .filter(|name| parser.vector_variable_needed(name))
            .collect();
        let output = json!({
            "formula": args.formula,
            "result": value,
            "needed": {
                "scalars": needed_scalars,
                "vectors": needed_vectors,
            },
        });
        println!("{output}");
        return;
    }

    match value {
        Value::Scalar(v) => println!("{v}"),
        Value::Vector([x, y, z]) => println!("{x} {y} {z}"),
    }
}
