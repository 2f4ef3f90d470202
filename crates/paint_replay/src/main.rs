//! Replays a recorded page load against the paint timing coordinator.
//!
//! Reads a JSON event script, drives a virtual-clock host through it and prints
//! each candidate update followed by the final metric, one JSON object per line.

use anyhow::{Context as _, Result, anyhow};
use std::env;
use std::fs::read_to_string;
use std::io::{Write as _, stderr, stdout};
use std::path::PathBuf;

mod script;

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct Options {
    script: PathBuf,
    overrides: script::Overrides,
}

/// Print usage information to stderr.
fn print_usage() {
    drop(writeln!(
        stderr(),
        "Usage:\n  paint_replay <SCRIPT.json> [--quiet-ms <MS>] [--native]"
    ));
}

/// # Errors
/// Returns an error for unknown flags, a missing script path or a bad `--quiet-ms` value.
fn parse_args(args: &[String]) -> Result<Options> {
    let mut script_path: Option<PathBuf> = None;
    let mut overrides = script::Overrides::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--quiet-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| anyhow!("--quiet-ms needs a value"))?;
                overrides.quiet_ms = Some(
                    value
                        .parse::<u64>()
                        .with_context(|| format!("invalid --quiet-ms '{value}'"))?,
                );
                index += 2;
            }
            "--native" => {
                overrides.native = true;
                index += 1;
            }
            flag if flag.starts_with("--") => return Err(anyhow!("unknown argument '{flag}'")),
            path => {
                if script_path.is_some() {
                    return Err(anyhow!("unexpected extra argument '{path}'"));
                }
                script_path = Some(PathBuf::from(path));
                index += 1;
            }
        }
    }
    let script = script_path.ok_or_else(|| anyhow!("missing script path"))?;
    Ok(Options { script, overrides })
}

/// # Errors
/// Returns an error if arguments are invalid or the script cannot be read or parsed.
fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(&args).inspect_err(|_| print_usage())?;
    let input = read_to_string(&options.script)
        .with_context(|| format!("reading {}", options.script.display()))?;
    let outcome = script::replay(script::parse(&input)?, &options.overrides)?;
    let mut out = stdout().lock();
    for line in script::render(&outcome)? {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
