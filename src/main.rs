use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use treelox::ast::AstPrinter;
use treelox::{parser, scanner, Config, Lox, EXIT_STATIC_ERROR};

const EXIT_USAGE: u8 = 64;
const EXIT_IO: u8 = 74;

#[derive(Parser, Debug)]
#[command(version, about = "A tree-walking Lox interpreter", long_about = None)]
struct Args {
    /// Script to run. Starts a REPL when omitted.
    script: Option<PathBuf>,
    /// Print the scanned tokens instead of running.
    #[arg(long)]
    tokens: bool,
    /// Print the parsed syntax tree instead of running.
    #[arg(long)]
    ast: bool,
    /// Maximum depth of nested calls.
    #[arg(long, value_name = "N")]
    max_call_depth: Option<usize>,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::from(EXIT_USAGE);
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };
    let mut config = Config::default();
    if let Some(depth) = args.max_call_depth {
        config = config.max_call_depth(depth);
    }

    match &args.script {
        Some(path) => run_file(path, &args, config),
        None => run_prompt(config),
    }
}

fn run_file(path: &Path, args: &Args, config: Config) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read {}: {}", path.display(), err);
            return ExitCode::from(EXIT_IO);
        }
    };
    if args.tokens || args.ast {
        return dump(&source, args);
    }
    let mut lox = Lox::with_config(std::io::stdout(), config);
    match lox.run(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn dump(source: &str, args: &Args) -> ExitCode {
    let (tokens, errors) = scanner::scan_tokens(source);
    let mut failed = !errors.is_empty();
    if args.tokens {
        for token in &tokens {
            println!("{}", token);
        }
    }
    for err in &errors {
        eprintln!("{}", err);
    }
    if args.ast {
        let (statements, errors) = parser::parse(&tokens);
        failed |= !errors.is_empty();
        for err in &errors {
            eprintln!("{}", err);
        }
        println!("{}", AstPrinter {}.print(&statements));
    }
    if failed {
        ExitCode::from(EXIT_STATIC_ERROR as u8)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_prompt(config: Config) -> ExitCode {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not start the prompt: {}", err);
            return ExitCode::from(EXIT_IO);
        }
    };
    let mut lox = Lox::with_config(std::io::stdout(), config);
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                if let Err(err) = lox.run_line(&line) {
                    eprintln!("{}", err);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::from(EXIT_IO);
            }
        }
    }
}
