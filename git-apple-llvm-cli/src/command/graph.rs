//! The `graph` command.

use clap::{Arg, ArgMatches};
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::am::{self, FsStateStore, StateStore};
use git_apple_llvm::git::GitContext;

use crate::command::{status, CommandResult};
use crate::exit_code::ExitCode;

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("graph")
        .about("Render the automerger edge graph")
        .arg(
            Arg::new("NO_FETCH")
                .long("no-fetch")
                .help("Do not fetch the remote (WARNING: the graph will be stale!)"),
        )
        .arg(
            Arg::new("FORMAT")
                .long("format")
                .value_name("format")
                .takes_value(true)
                .default_value("pdf")
                .help("The file format for the generated graph"),
        )
        .arg(
            Arg::new("CI_STATUS")
                .long("ci-status")
                .help("Color the edges with per-commit CI status"),
        )
        .arg(
            Arg::new("REMOTE")
                .long("remote")
                .value_name("remote")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("The remote(s)"),
        )
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    let remotes: Vec<String> = matches
        .values_of("REMOTE")
        .map(|values| values.map(Into::into).collect())
        .unwrap_or_else(|| vec!["origin".into()]);
    let ctx = GitContext::current_dir();
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    if !matches.is_present("NO_FETCH") {
        status::fetch_remotes(&ctx, &remotes, &mut stdout)?;
    }

    let store = if matches.is_present("CI_STATUS") {
        Some(FsStateStore::new()?)
    } else {
        None
    };
    let store_ref = store.as_ref().map(|store| store as &dyn StateStore);

    let format = matches.value_of("FORMAT").expect("--format has a default");
    for remote in &remotes {
        am::print_graph(&ctx, remote, format, store_ref, &mut stdout)?;
    }

    Ok(ExitCode::Success)
}
