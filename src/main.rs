use std::io::{BufRead, Write, stdin, stdout};

use calculator::Interpreter;
use calculator::Lexer;
use calculator::eval::{ArithmeticError, InterpretationError};
use calculator::lex::ScanError;
use calculator::parse::SyntaxError;
use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;

const PROMPT: &str = "calc> ";

/// Evaluates arithmetic and bitwise expressions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Read expressions line by line and print each result (the default).
    Repl {
        #[arg(long, default_value = PROMPT)]
        prompt: String,

        /// Stop at the first expression that fails instead of reporting it.
        #[arg(long)]
        exit_on_error: bool,
    },
    /// Evaluate a single expression.
    Eval { expression: String },
    /// Print the tokens of an expression.
    Tokenize { expression: String },
    /// Print the syntax tree of an expression.
    Parse { expression: String },
}

fn main() -> miette::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Repl {
        prompt: PROMPT.to_string(),
        exit_on_error: false,
    }) {
        Commands::Repl {
            prompt,
            exit_on_error,
        } => repl(&prompt, exit_on_error)?,
        Commands::Eval { expression } => {
            match Interpreter::new(Some("<argument>"), &expression).interpret() {
                Ok(value) => println!("{value:?}"),
                Err(e) => fail(e),
            }
        }
        Commands::Tokenize { expression } => {
            for token in Lexer::new(Some("<argument>"), &expression) {
                match token {
                    Ok(token) => println!("{token}"),
                    Err(e) => fail(e),
                }
            }
        }
        Commands::Parse { expression } => {
            match calculator::Parser::new(Some("<argument>"), &expression).and_then(|p| p.parse())
            {
                Ok(expr) => println!("{expr}"),
                Err(e) => fail(e),
            }
        }
    }
    Ok(())
}

fn repl(prompt: &str, exit_on_error: bool) -> miette::Result<()> {
    let mut lines = stdin().lock().lines();
    loop {
        print!("{prompt}");
        stdout()
            .flush()
            .into_diagnostic()
            .wrap_err("flushing the prompt failed")?;

        let Some(line) = lines.next() else {
            println!();
            return Ok(());
        };
        let line = line
            .into_diagnostic()
            .wrap_err("reading from stdin failed")?;
        if line.trim().is_empty() {
            continue;
        }

        match Interpreter::new(Some("<stdin>"), &line).interpret() {
            Ok(value) => println!("{value:?}"),
            Err(e) if exit_on_error => fail(e),
            Err(e) => {
                log::info!("{} in `{line}`", kind(&e));
                eprintln!("{e:?}");
            }
        }
    }
}

fn kind(e: &miette::Error) -> &'static str {
    if e.downcast_ref::<ScanError>().is_some() {
        "scan error"
    } else if e.downcast_ref::<SyntaxError>().is_some() {
        "syntax error"
    } else if e.downcast_ref::<InterpretationError>().is_some() {
        "interpretation error"
    } else if e.downcast_ref::<ArithmeticError>().is_some() {
        "arithmetic error"
    } else {
        "error"
    }
}

fn fail(e: miette::Error) -> ! {
    eprintln!("Error: {}", kind(&e));
    eprintln!("{e:?}");
    std::process::exit(65);
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn repl_prompt_defaults_to_shared_constant() {
        let args = Args::try_parse_from(["calculator", "repl"]).unwrap();
        match args.command {
            Some(Commands::Repl {
                prompt,
                exit_on_error,
            }) => {
                assert_eq!(prompt, PROMPT);
                assert!(!exit_on_error);
            }
            other => panic!("expected the repl subcommand, got {other:?}"),
        }

        let args = Args::try_parse_from(["calculator"]).unwrap();
        assert!(args.command.is_none());
    }
}
