//! The `push` command.

use clap::{Arg, ArgMatches};
use log::LevelFilter;
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::git::GitContext;
use git_apple_llvm::push::{self, MergeStrategy, PushOptions};

use crate::command::{CommandError, CommandResult};
use crate::exit_code::ExitCode;
use crate::logger;

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("push")
        .about("Push changes back to the split Git repositories")
        .arg(
            Arg::new("REFSPEC")
                .value_name("refspec")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("DRY_RUN")
                .long("dry-run")
                .help("Do not push changes to remotes"),
        )
        .arg(
            Arg::new("MERGE_STRATEGY")
                .long("merge-strategy")
                .value_name("strategy")
                .takes_value(true)
                .possible_values(["ff-only", "rebase", "rebase-or-merge"])
                .default_value("rebase-or-merge")
                .help(
                    "The strategy to employ for forwarding split repo commits \
                     on top of the target branch",
                ),
        )
        .arg(
            Arg::new("PUSH_LIMIT")
                .long("push-limit")
                .value_name("N")
                .takes_value(true)
                .default_value("50")
                .help("Prohibit pushing a lot of commits, use 0 for unlimited"),
        )
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    if matches.is_present("VERBOSE") {
        logger::set_console_level(LevelFilter::Debug);
    }

    let refspec = matches.value_of("REFSPEC").expect("refspec is required");
    let merge_strategy = matches
        .value_of("MERGE_STRATEGY")
        .and_then(MergeStrategy::parse)
        .expect("--merge-strategy is validated");
    let push_limit = matches
        .value_of("PUSH_LIMIT")
        .expect("--push-limit has a default");
    let push_limit: usize = push_limit.parse().map_err(|_| {
        CommandError::fatal(format!("invalid push limit \"{}\"", push_limit))
    })?;

    let options = PushOptions {
        dry_run: matches.is_present("DRY_RUN"),
        merge_strategy,
        push_limit,
    };
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    push::push_refspec(&GitContext::current_dir(), refspec, &options, &mut stdout)?;

    Ok(ExitCode::Success)
}
