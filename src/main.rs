mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod provider;
mod stack;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--stack` override of the stack file
    pub stack_file: Option<PathBuf>,
    /// `-p NAME=VALUE` pairs, in the order given
    pub parameters: Vec<(String, String)>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        stack_file: cli.stack,
        parameters: cli.parameters,
    };

    match cli.command {
        Command::Synth(args) => commands::synth::run(&ctx, args.out.as_deref()),
        Command::Plan(args) => commands::plan::run(&ctx, args.target.as_deref()),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Destroy(args) => commands::destroy::run(&ctx, args.yes),
        Command::Status(args) => commands::status::run(&ctx, args.refresh),
        Command::Graph(args) => commands::graph::run(&ctx, args.dot),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "greenstack", &mut io::stdout());
            Ok(())
        }
    }
}
