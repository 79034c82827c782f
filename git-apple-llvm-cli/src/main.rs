//! git-apple-llvm
//!
//! The command line tool for the apple-llvm monorepo automation: automerger
//! status and graph reporting, merge-result bookkeeping, pushes to the split
//! repositories, and pull-request workflows.

use clap::Arg;
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::utils::echo_fatal;

mod command;
use command::CommandError;

mod exit_code;
use exit_code::ExitCode;

mod logger;

fn try_main() -> Result<ExitCode, CommandError> {
    let matches = clap::Command::new("git-apple-llvm")
        .version(clap::crate_version!())
        .about("Monorepo automation for apple-llvm")
        .arg(
            Arg::new("VERBOSE")
                .short('v')
                .long("verbose")
                .help("Increase verbosity")
                .multiple_occurrences(true)
                .global(true),
        )
        .subcommand(command::status::subcommand())
        .subcommand(command::graph::subcommand())
        .subcommand(command::result::subcommand())
        .subcommand(command::url::subcommand())
        .subcommand(command::push::subcommand())
        .subcommand(command::pr::subcommand())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .get_matches();

    logger::init(matches.occurrences_of("VERBOSE"));

    match matches.subcommand() {
        Some(("status", matches)) => command::status::run(matches),
        Some(("graph", matches)) => command::graph::run(matches),
        Some(("result", matches)) => command::result::run(matches),
        Some(("url", matches)) => command::url::run(matches),
        Some(("push", matches)) => command::push::run(matches),
        Some(("pr", matches)) => command::pr::run(matches),
        Some((subcommand, _)) => {
            Err(CommandError::fatal(format!(
                "unknown command '{}'",
                subcommand,
            )))
        },
        None => Ok(ExitCode::Success),
    }
}

fn main() {
    match try_main() {
        Ok(code) => {
            code.exit();
        },
        Err(err) => {
            let mut stderr = StandardStream::stderr(ColorChoice::Auto);
            echo_fatal(&mut stderr, &err.to_string());
            ExitCode::Failure.exit();
        },
    }
}
