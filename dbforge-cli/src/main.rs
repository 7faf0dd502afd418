//! Main entry point for the dbforge CLI.

mod cli;
mod commands;
mod env;

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

use cli::{Cli, Command};

fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();

    let mut builder = Builder::new();
    builder
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter_level(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .target(Target::Stdout)
        .init();

    let config = env::resolve(&cli)?;

    let result = match cli.command {
        Command::New { name } => commands::new_migration(config, &name),
        Command::Up => commands::up(config),
        Command::Create => commands::create(config),
        Command::Drop => commands::drop(config),
        Command::Migrate => commands::migrate(config),
        Command::Rollback => commands::rollback(config),
        Command::Status { exit_code } => commands::status(config, exit_code),
        Command::Dump => commands::dump(config),
        Command::Wait => commands::wait(config),
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
