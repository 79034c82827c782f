//! The `result` command.

use clap::{Arg, ArgMatches};
use itertools::Itertools;
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::am::{CommitState, FsStateStore, StateStore};
use git_apple_llvm::utils::echo;

use crate::command::{CommandError, CommandResult};
use crate::exit_code::ExitCode;

fn merge_id_arg() -> Arg<'static> {
    Arg::new("MERGE_ID")
        .value_name("merge_id")
        .env("MERGE_ID")
        .required(true)
        .takes_value(true)
}

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("result")
        .about("Set and get merge results")
        .subcommand_required(true)
        .subcommand(
            clap::Command::new("set")
                .about("Set the merge status for a merge ID")
                .arg(merge_id_arg())
                .arg(
                    Arg::new("STATUS")
                        .value_name("status")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::Command::new("get")
                .about("Get the merge status of a merge ID")
                .arg(merge_id_arg()),
        )
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    let store = FsStateStore::new()?;
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    match matches.subcommand() {
        Some(("set", matches)) => {
            let merge_id = matches.value_of("MERGE_ID").expect("merge_id is required");
            let status = matches.value_of("STATUS").expect("status is required");
            if CommitState::parse(status).is_none() {
                return Err(CommandError::fatal(format!(
                    "Status must be one of {}.",
                    CommitState::all().iter().map(|state| state.as_str()).join(", "),
                )));
            }
            store.set(merge_id, status)?;
            echo(&mut stdout, &format!("Set {} to {}", merge_id, status));
        },
        Some(("get", matches)) => {
            let merge_id = matches.value_of("MERGE_ID").expect("merge_id is required");
            let value = store.get(merge_id)?;
            echo(&mut stdout, value.as_deref().unwrap_or("None"));
        },
        _ => unreachable!("a subcommand is required"),
    }

    Ok(ExitCode::Success)
}
