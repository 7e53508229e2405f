//! Command-line surface (§6). Subcommands mirror the original tool's
//! argument shape one-for-one; flag parsing and file I/O use `clap`/`clio`
//! the way the teacher's own CLI does, rather than hand-rolling either.

#![cfg(feature = "cli")]

use std::collections::HashMap;
use std::io::Read as _;

use clap::{Parser, Subcommand};
use clio::Input;

#[derive(Debug, Parser)]
#[command(name = "logica", about = "Compiler for the Logica logic-programming language")]
pub struct Cli {
    /// Input `.l` file, or `-` for stdin.
    #[arg(value_parser = clap::value_parser!(Input))]
    pub file: Input,

    /// How to render the Concertina action graph while running predicates:
    /// `none` (default), `ascii`, or `graph` (Graphviz `dot` source).
    #[arg(long, default_value = "none")]
    pub display: crate::concertina::display::DisplayMode,

    /// YAML file overriding the default engine, search paths, and flags.
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse the file and print its AST as JSON.
    Parse,
    /// Run the minimal type inferencer and print any diagnostics as JSON.
    InferTypes,
    /// Print every builtin/operator signature available to the file's dialect.
    ShowSignatures,
    /// Print the compiled SQL for one or more predicates, without running it.
    Print {
        predicates: String,
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
    },
    /// Compile and execute one or more predicates.
    Run {
        predicates: String,
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
    },
    /// Compile, execute, and write the result as CSV.
    RunToCsv {
        predicates: String,
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
    },
    /// Compile, execute, and render the result as an ASCII table.
    RunInTerminal {
        predicates: String,
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
    },
    /// Print the inferred column schema of one or more predicates.
    BuildSchema { predicates: String },
}

fn parse_flag(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw.split_once('=').ok_or_else(|| format!("malformed --flag `{raw}`, expected name=value"))?;
    Ok((name.to_string(), value.to_string()))
}

impl Command {
    pub fn predicates(&self) -> Option<Vec<String>> {
        let raw = match self {
            Command::Print { predicates, .. }
            | Command::Run { predicates, .. }
            | Command::RunToCsv { predicates, .. }
            | Command::RunInTerminal { predicates, .. }
            | Command::BuildSchema { predicates } => predicates,
            Command::Parse | Command::InferTypes | Command::ShowSignatures => return None,
        };
        Some(raw.split(',').map(|s| s.trim().to_string()).collect())
    }

    pub fn flags(&self) -> HashMap<String, String> {
        let pairs = match self {
            Command::Print { flags, .. }
            | Command::Run { flags, .. }
            | Command::RunToCsv { flags, .. }
            | Command::RunInTerminal { flags, .. } => flags.clone(),
            Command::Parse | Command::InferTypes | Command::ShowSignatures | Command::BuildSchema { .. } => Vec::new(),
        };
        pairs.into_iter().collect()
    }
}

pub fn read_source(input: &mut Input) -> std::io::Result<String> {
    let mut buf = String::new();
    input.read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_pairs() {
        assert_eq!(parse_flag("threshold=10").unwrap(), ("threshold".to_string(), "10".to_string()));
        assert!(parse_flag("no-equals-sign").is_err());
    }

    #[test]
    fn predicate_list_splits_and_trims() {
        let cmd = Command::Run { predicates: "A, B ,C".to_string(), flags: Vec::new() };
        assert_eq!(cmd.predicates().unwrap(), vec!["A".to_string(), "B".to_string(), "C".to_string()]);
    }
}
