//! # confscope
//!
//! Resolve configuration document paths against the Rust structs that
//! declare them.
//!
//! ```sh
//! confscope --project app=src resolve web.port
//! confscope --project app=src --dep shared=../shared/src check app.toml
//! confscope keys web.middlewares --json
//! ```
//!
//! Set `RUST_LOG=confscope=debug` to see index builds and cache activity.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use confscope::{Command, EngineArgs};

#[derive(Parser, Debug)]
#[command(name = "confscope", version)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = cli.engine.builder().build()?;
    let outcome = engine.handle(&cli.command.into_action())?;
    if cli.engine.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{outcome}");
    }
    Ok(if outcome.has_problems() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
