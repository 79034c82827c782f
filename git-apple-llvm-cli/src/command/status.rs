//! The `status` command.

use clap::{Arg, ArgMatches};
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::am::{self, FsStateStore, StateStore, StatusOptions};
use git_apple_llvm::git::GitContext;
use git_apple_llvm::utils::echo;

use crate::command::CommandResult;
use crate::exit_code::ExitCode;

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("status")
        .about("Report the status of the configured automerger edges")
        .arg(
            Arg::new("TARGET")
                .long("target")
                .value_name("branch")
                .takes_value(true)
                .help(
                    "The target branch for which the status should be reported. \
                     All branches are shown by default.",
                ),
        )
        .arg(
            Arg::new("ALL_COMMITS")
                .long("all-commits")
                .help("List all outstanding commits in the merge backlog"),
        )
        .arg(
            Arg::new("REMOTE")
                .long("remote")
                .value_name("remote")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("The remote(s)"),
        )
        .arg(
            Arg::new("NO_FETCH")
                .long("no-fetch")
                .help("Do not fetch the remote (WARNING: status will be stale!)"),
        )
        .arg(
            Arg::new("CI_STATUS")
                .long("ci-status")
                .help("Query additional per-commit CI status"),
        )
        .arg(
            Arg::new("GRAPH")
                .long("graph")
                .help("Generate the automerger graph"),
        )
        .arg(
            Arg::new("GRAPH_FORMAT")
                .long("graph-format")
                .value_name("format")
                .takes_value(true)
                .help(
                    "The file format for the generated graph. Passing this \
                     argument implies passing --graph.",
                ),
        )
}

/// Fetch the remotes that the status will be computed against.
pub fn fetch_remotes(
    ctx: &GitContext,
    remotes: &[String],
    out: &mut StandardStream,
) -> CommandResult<()> {
    for remote in remotes {
        echo(
            out,
            &format!("❕ Fetching \"{}\" to provide the latest status...", remote),
        );
        ctx.git().arg("fetch").arg(remote).show_stderr().run()?;
        echo(out, "✅ Fetch succeeded!\n");
    }
    Ok(())
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    let remotes: Vec<String> = matches
        .values_of("REMOTE")
        .map(|values| values.map(Into::into).collect())
        .unwrap_or_else(|| vec!["origin".into()]);
    let ctx = GitContext::current_dir();
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    if !matches.is_present("NO_FETCH") {
        fetch_remotes(&ctx, &remotes, &mut stdout)?;
    }

    let store = if matches.is_present("CI_STATUS") {
        Some(FsStateStore::new()?)
    } else {
        None
    };
    let store_ref = store.as_ref().map(|store| store as &dyn StateStore);

    let options = StatusOptions {
        target_branch: matches.value_of("TARGET"),
        list_commits: matches.is_present("ALL_COMMITS"),
        query_ci_status: store.is_some(),
    };
    let mut printed = false;
    for remote in &remotes {
        if printed {
            echo(&mut stdout, "");
        }
        am::print_status(&ctx, remote, &options, store_ref, &mut stdout)?;
        printed = true;
    }

    let graph_format = matches.value_of("GRAPH_FORMAT").or_else(|| {
        matches.is_present("GRAPH").then(|| "pdf")
    });
    if let Some(format) = graph_format {
        for remote in &remotes {
            am::print_graph(&ctx, remote, format, store_ref, &mut stdout)?;
        }
    }

    Ok(ExitCode::Success)
}
