//! The `url` command.

use clap::{Arg, ArgMatches};
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::am::{self, FsStateStore};
use git_apple_llvm::utils::echo;

use crate::command::CommandResult;
use crate::exit_code::ExitCode;

fn merge_id_arg() -> Arg<'static> {
    Arg::new("MERGE_ID")
        .value_name("merge_id")
        .env("MERGE_ID")
        .required(true)
        .takes_value(true)
}

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("url")
        .about("Set and get build URLs")
        .subcommand_required(true)
        .subcommand(
            clap::Command::new("seturl")
                .about("Set the build URL for a merge ID")
                .arg(merge_id_arg())
                .arg(
                    Arg::new("BUILD_URL")
                        .value_name("build_url")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::Command::new("geturl")
                .about("Get the build URL for a merge ID")
                .arg(merge_id_arg()),
        )
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    let store = FsStateStore::new()?;
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    match matches.subcommand() {
        Some(("seturl", matches)) => {
            let merge_id = matches.value_of("MERGE_ID").expect("merge_id is required");
            let build_url = matches.value_of("BUILD_URL").expect("build_url is required");
            am::set_build_url(&store, merge_id, build_url)?;
            echo(
                &mut stdout,
                &format!("Set build URL for {} to {}", merge_id, build_url),
            );
        },
        Some(("geturl", matches)) => {
            let merge_id = matches.value_of("MERGE_ID").expect("merge_id is required");
            let value = am::get_build_url(&store, merge_id)?;
            echo(&mut stdout, value.as_deref().unwrap_or("None"));
        },
        _ => unreachable!("a subcommand is required"),
    }

    Ok(ExitCode::Success)
}
