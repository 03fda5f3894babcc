//!
//! folio shell binary
//! ------------------
//! Interactive interpreter over an in-process folio repository. Runs one-shot
//! commands with `-q`, then drops into a line editor unless `--no-repl` is given.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use folio::cli::{Shell, Step, shell::HELP};
use folio::config::RepositoryConfig;
use folio::Repository;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <file.json>] [-q \"<command>\"]... [--no-repl]\n\nFlags:\n  --config <path>      JSON repository settings; FOLIO_* environment variables override them\n  -q, --query <cmd>    run a shell command or query before the prompt (repeatable)\n  --no-repl            exit after the -q commands\n  -h, --help           show this help\n\n{HELP}"
    );
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let mut config_path: Option<PathBuf> = None;
    let mut commands: Vec<String> = Vec::new();
    let mut repl = true;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { eprintln!("--config requires a value"); print_usage(&program); std::process::exit(2); }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--query" | "-q" => {
                if i + 1 >= args.len() { eprintln!("--query requires a value"); print_usage(&program); std::process::exit(2); }
                commands.push(args[i + 1].clone());
                i += 2; continue;
            }
            "--no-repl" => { repl = false; i += 1; continue; }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            unk => {
                eprintln!("Unrecognized argument: {}", unk);
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let config = RepositoryConfig::load(config_path.as_deref())?;
    info!(
        target: "folio",
        "folio starting: repository='{}', principal='{}', index={}, RUST_LOG='{}'",
        config.repository_id,
        config.default_principal,
        config.index.enabled,
        env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string())
    );
    let mut shell = Shell::new(Repository::new(config));

    for cmd in &commands {
        match shell.execute(cmd) {
            Ok(Step::Output(out)) => { if !out.is_empty() { println!("{}", out); } }
            Ok(Step::Quit) => return Ok(()),
            Err(e) => eprintln!("error: {:#}", e),
        }
    }
    if !repl { return Ok(()); }
    run_repl(&mut shell)
}

fn run_repl(shell: &mut Shell) -> Result<()> {
    let config = Config::builder().auto_add_history(true).build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config).context("creating line editor")?;
    println!("folio shell. Type 'help' for commands.");
    loop {
        let prompt = format!("{}> ", shell.cwd());
        match rl.readline(&prompt) {
            Ok(line) => match shell.execute(&line) {
                Ok(Step::Output(out)) => { if !out.is_empty() { println!("{}", out); } }
                Ok(Step::Quit) => break,
                Err(e) => eprintln!("error: {:#}", e),
            },
            Err(ReadlineError::Interrupted) => println!("Use quit or Ctrl-D to exit"),
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
