//! A tree-walking interpreter for Lox.
//!
//! Source text goes through [`scanner`], [`parser`] and [`resolver`]; if any
//! of them reports errors the program never runs. Scan and parse errors are
//! reported together. Otherwise the [`interpreter`] walks the tree against a
//! global scope that a [`Lox`] session keeps alive between runs.

pub mod ast;
pub mod callable;
pub mod class;
pub mod config;
pub mod environment;
pub mod heap;
pub mod instance;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod stack;
pub mod token;
pub mod value;

pub use config::Config;
pub use heap::GcStats;
pub use interpreter::RuntimeError;
pub use parser::ParseError;
pub use resolver::ResolveError;
pub use scanner::ScanError;
pub use value::Value;

use crate::interpreter::Interpreter;
use crate::resolver::Resolver;
use std::fmt::Display;
use std::io::{self, Write};
use thiserror::Error;

/// Exit code for programs that fail to scan, parse or resolve.
pub const EXIT_STATIC_ERROR: i32 = 65;
/// Exit code for programs that fail while running.
pub const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoxError {
    /// Scan and parse errors from the same source, reported together.
    #[error("{}", syntax_lines(.scan, .parse).join("\n"))]
    Syntax {
        scan: Vec<ScanError>,
        parse: Vec<ParseError>,
    },
    #[error("{}", lines(.0))]
    Resolve(Vec<ResolveError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn lines<E: Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<String>>()
        .join("\n")
}

/// Scan and parse diagnostics merged by line. Scan errors come first on a shared line.
fn syntax_lines(scan: &[ScanError], parse: &[ParseError]) -> Vec<String> {
    let mut merged: Vec<(usize, String)> = scan
        .iter()
        .map(|e| (e.line, e.to_string()))
        .chain(parse.iter().map(|e| (e.line, e.to_string())))
        .collect();
    merged.sort_by_key(|(line, _)| *line);
    merged.into_iter().map(|(_, text)| text).collect()
}

impl LoxError {
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Syntax { .. } | LoxError::Resolve(_) => EXIT_STATIC_ERROR,
            LoxError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }
    /// One rendered message per diagnostic, in source order.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            LoxError::Syntax { scan, parse } => syntax_lines(scan, parse),
            LoxError::Resolve(errors) => errors.iter().map(|e| e.to_string()).collect(),
            LoxError::Runtime(error) => vec![error.to_string()],
        }
    }
}

/// An interpreter session. Globals persist from one `run` to the next.
pub struct Lox<W: Write = io::Stdout> {
    interpreter: Interpreter<W>,
}

impl Lox<io::Stdout> {
    pub fn new() -> Lox<io::Stdout> {
        Lox::with_config(io::stdout(), Config::default())
    }
}

impl Default for Lox<io::Stdout> {
    fn default() -> Self {
        Lox::new()
    }
}

impl<W: Write> Lox<W> {
    /// A session whose `print` output goes to `output` instead of stdout.
    pub fn with_output(output: W) -> Lox<W> {
        Lox::with_config(output, Config::default())
    }
    pub fn with_config(output: W, config: Config) -> Lox<W> {
        Lox {
            interpreter: Interpreter::with_output(output, config),
        }
    }
    /// Scans, parses, resolves and runs a whole program.
    pub fn run(&mut self, source: &str) -> Result<(), LoxError> {
        // The scanner drops what it can't read, so the parser still sees the rest.
        let (tokens, scan) = scanner::scan_tokens(source);
        let (statements, parse) = parser::parse(&tokens);
        if !scan.is_empty() || !parse.is_empty() {
            return Err(LoxError::Syntax { scan, parse });
        }
        Resolver::new()
            .resolve(&statements)
            .map_err(LoxError::Resolve)?;
        self.interpreter.interpret(&statements)?;
        Ok(())
    }
    /// Runs one line of REPL input. A runtime error abandons the rest of the
    /// line but keeps every global defined so far.
    pub fn run_line(&mut self, line: &str) -> Result<(), LoxError> {
        self.run(line)
    }
    pub fn output(&self) -> &W {
        self.interpreter.output()
    }
    pub fn into_output(self) -> W {
        self.interpreter.into_output()
    }
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.interpreter.global(name)
    }
    /// Forces a collection and reports what survived.
    pub fn collect_garbage(&mut self) -> GcStats {
        self.interpreter.collect_garbage()
    }
}

/// Runs a program in a fresh session that prints to stdout.
pub fn run(source: &str) -> Result<(), LoxError> {
    Lox::new().run(source)
}

#[cfg(test)]
mod lox_tests {
    use crate::{Lox, LoxError, EXIT_RUNTIME_ERROR, EXIT_STATIC_ERROR};

    #[test]
    fn stages_gate_each_other() {
        let mut lox = Lox::with_output(Vec::new());
        let err = lox.run("print 1; @").unwrap_err();
        assert!(matches!(err, LoxError::Syntax { .. }));
        assert_eq!(err.exit_code(), EXIT_STATIC_ERROR);
        // Nothing ran.
        assert!(lox.output().is_empty());

        let err = lox.run("print 1; print;").unwrap_err();
        assert!(matches!(err, LoxError::Syntax { .. }));
        let err = lox.run("print 1; return;").unwrap_err();
        assert!(matches!(err, LoxError::Resolve(_)));
        assert!(lox.output().is_empty());

        let err = lox.run("print 1; print x;").unwrap_err();
        assert_eq!(err.exit_code(), EXIT_RUNTIME_ERROR);
        assert_eq!(err.to_string(), "[line 1] Error: Undefined variable 'x'.");
        assert_eq!(lox.output(), b"1\n");
    }

    #[test]
    fn batched_diagnostics_render_one_per_line() {
        let err = Lox::with_output(Vec::new())
            .run("var a = 1; @\nvar b = #2;")
            .unwrap_err();
        assert_eq!(
            err.diagnostics(),
            vec![
                "[line 1] Error: Unexpected character '@'.",
                "[line 2] Error: Unexpected character '#'."
            ]
        );
        assert_eq!(err.to_string(), err.diagnostics().join("\n"));
    }

    #[test]
    fn scan_and_parse_errors_interleave_by_line() {
        let err = Lox::with_output(Vec::new())
            .run("print (1;\nvar b = 2 @;")
            .unwrap_err();
        assert_eq!(
            err.diagnostics(),
            vec![
                "[line 1] Error at ';': Expect ')' after expression.",
                "[line 2] Error: Unexpected character '@'.",
            ]
        );
        assert_eq!(err.exit_code(), EXIT_STATIC_ERROR);
    }
}
