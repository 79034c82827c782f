//! The `pr` command.

use clap::{Arg, ArgMatches};
use termcolor::{ColorChoice, StandardStream};

use git_apple_llvm::git::{self, GitContext};
use git_apple_llvm::pr::{
    self, CiTestType, PrTool, PrToolConfig, PrToolType, PullRequestInfo, PullRequestState,
};
use git_apple_llvm::utils::{echo, echo_bold};
use git_apple_llvm_github::GithubPrTool;

use crate::command::{CommandError, CommandResult};
use crate::exit_code::ExitCode;

pub fn subcommand() -> clap::Command<'static> {
    clap::Command::new("pr")
        .about("Tool for working with pull requests")
        .subcommand_required(true)
        .subcommand(
            clap::Command::new("list")
                .about("List pull requests")
                .arg(
                    Arg::new("TARGET")
                        .long("target")
                        .value_name("branch")
                        .takes_value(true)
                        .help("List pull requests for the specified target branch only"),
                ),
        )
        .subcommand(
            clap::Command::new("test")
                .about("Trigger pull request testing")
                .arg(
                    Arg::new("PR_REF")
                        .value_name("<#pr / branch-name>")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("TEST")
                        .long("test")
                        .value_name("plan")
                        .takes_value(true)
                        .help("The test plan to dispatch"),
                ),
        )
        .subcommand(
            clap::Command::new("create")
                .about("Create a new pull request")
                // `-h` names the head branch, as with `git push`.
                .disable_help_flag(true)
                .arg(
                    Arg::new("TITLE")
                        .short('m')
                        .value_name("title")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("HEAD")
                        .short('h')
                        .value_name("head")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("BASE")
                        .short('b')
                        .value_name("base")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("DRY_RUN")
                        .long("dry-run")
                        .help("Do not create the pull request"),
                ),
        )
}

/// How a pull request may be referred to on the command line.
enum PullRequestRef {
    Number(u64),
    Branch(String),
}

impl PullRequestRef {
    fn parse(value: &str) -> CommandResult<Self> {
        if let Some(number) = value.strip_prefix('#') {
            let number = number.parse().map_err(|_| {
                CommandError::fatal(format!("'{}' is not a valid pull request number", value))
            })?;
            return Ok(PullRequestRef::Number(number));
        }
        Ok(PullRequestRef::Branch(value.into()))
    }
}

fn max_length(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.into();
    }
    let truncated: String = text.chars().take(max_len - 3).collect();
    format!("{}...", truncated)
}

fn shorten(text: &str) -> String {
    max_length(text, 40)
}

fn create_tool(config: &PrToolConfig) -> CommandResult<Box<dyn PrTool>> {
    match config.tool_type {
        PrToolType::GitHub => {
            Ok(Box::new(GithubPrTool::new(
                &config.domain,
                &config.user,
                &config.repo,
            )?))
        },
    }
}

fn list(
    tool: &dyn PrTool,
    target: Option<&str>,
    out: &mut StandardStream,
) -> CommandResult<()> {
    for pr in tool.list()? {
        if let Some(target) = target {
            if pr.base_branch != target {
                continue;
            }
        }

        let number_text = format!("- [#{}] ", pr.number);
        let title_options = textwrap::Options::new(80)
            .initial_indent(&number_text)
            .subsequent_indent("  ");
        echo_bold(out, &textwrap::fill(&pr.title, title_options));
        echo(out, &format!("  {}", pr.url));
        echo(out, "");

        if pr.body_text.is_empty() {
            continue;
        }
        let body_options = textwrap::Options::new(80)
            .initial_indent("  ")
            .subsequent_indent("  ");
        let mut body_lines: Vec<String> = textwrap::wrap(&pr.body_text, body_options)
            .into_iter()
            .map(Into::into)
            .collect();
        if body_lines.len() > 5 {
            body_lines.truncate(4);
            body_lines.push("  ...".into());
        }
        echo(out, &body_lines.join("\n"));
        echo(out, "");
    }

    Ok(())
}

fn resolve_pr(
    ctx: &GitContext,
    tool: &dyn PrTool,
    pr_ref: &PullRequestRef,
) -> CommandResult<PullRequestInfo> {
    match pr_ref {
        PullRequestRef::Number(number) => {
            tool.pr_from_number(*number)?.ok_or_else(|| {
                CommandError::fatal(format!("pull request #{} does not exist", number))
            })
        },
        PullRequestRef::Branch(branch) => {
            // Branches name the head of a pull request on the remote.
            let head_branch = git::tracked_branch_ref(ctx, branch)
                .map(|tracked| tracked.branch_name)
                .unwrap_or_else(|| branch.clone());
            tool.list()?
                .into_iter()
                .find(|pr| pr.head_branch == head_branch)
                .ok_or_else(|| {
                    CommandError::fatal(format!(
                        "no pull request found for branch \"{}\"",
                        branch,
                    ))
                })
        },
    }
}

fn test(
    ctx: &GitContext,
    tool: &dyn PrTool,
    config: &PrToolConfig,
    pr_ref: &PullRequestRef,
    test_plan: Option<&str>,
    out: &mut StandardStream,
) -> CommandResult<()> {
    let pr = resolve_pr(ctx, tool, pr_ref)?;
    if pr.state != PullRequestState::Open {
        return Err(CommandError::fatal(format!(
            "pull request #{} ({}) is no longer open",
            pr.number,
            shorten(&pr.title),
        )));
    }

    echo_bold(
        out,
        &format!(
            "Triggering pull request testing for pr #{} by {}:",
            pr.number, pr.author_username,
        ),
    );
    echo(out, &format!("  {}", max_length(&pr.title, 78)));
    pr::trigger_test(ctx, tool, config.test_type, pr.number, test_plan)?;
    if config.test_type == CiTestType::SwiftCi {
        echo(
            out,
            "✅ you commented \"@swift-ci please test\" on the pull request.",
        );
    }

    Ok(())
}

fn create(
    ctx: &GitContext,
    tool: &dyn PrTool,
    matches: &ArgMatches,
    out: &mut StandardStream,
) -> CommandResult<()> {
    let title = matches.value_of("TITLE").expect("title is required");
    let head = matches.value_of("HEAD").expect("head is required");
    let base = matches.value_of("BASE").expect("base is required");

    let tracked = git::tracked_branch_ref(ctx, head).ok_or_else(|| {
        CommandError::fatal(format!(
            "branch \"{}\" does not track a remote branch; push it first",
            head,
        ))
    })?;

    if matches.is_present("DRY_RUN") {
        echo(
            out,
            &format!(
                "🛑 dry run, would create a pull request for {} -> {}.",
                tracked.branch_name, base,
            ),
        );
        return Ok(());
    }

    let pr = tool.create_pr(
        title,
        base,
        Some(&tracked.remote_url),
        &tracked.branch_name,
    )?;
    echo(out, &format!("✅ created pull request: {}", pr.url));

    Ok(())
}

pub fn run(matches: &ArgMatches) -> CommandResult<ExitCode> {
    let ctx = GitContext::current_dir();
    if git::current_checkout_directory(&ctx).is_none() {
        return Err(CommandError::fatal("not a git repository"));
    }

    let config = pr::load_pr_config(&ctx)?.ok_or_else(|| {
        CommandError::fatal("missing `git apple-llvm pr` configuration file")
    })?;
    let tool = create_tool(&config)?;
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    match matches.subcommand() {
        Some(("list", matches)) => {
            list(tool.as_ref(), matches.value_of("TARGET"), &mut stdout)?;
        },
        Some(("test", matches)) => {
            let pr_ref =
                PullRequestRef::parse(matches.value_of("PR_REF").expect("pr ref is required"))?;
            test(
                &ctx,
                tool.as_ref(),
                &config,
                &pr_ref,
                matches.value_of("TEST"),
                &mut stdout,
            )?;
        },
        Some(("create", matches)) => {
            create(&ctx, tool.as_ref(), matches, &mut stdout)?;
        },
        _ => unreachable!("a subcommand is required"),
    }

    Ok(ExitCode::Success)
}
