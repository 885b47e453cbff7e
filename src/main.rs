use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

mod cli;

use crate::cli::{ApplyArgs, CheckArgs, Command, MarkArgs, RootArgs, StatusArgs, TasksArgs};
use migration_ledger::apply::{run_gated_jobs, ApplyOptions, ShellRunner};
use migration_ledger::config::{config_path, load_config, LedgerConfig};
use migration_ledger::remote::SshTransport;
use migration_ledger::session::DeploySession;
use migration_ledger::{status, tasks, util};

fn main() -> Result<ExitCode> {
    let cli = RootArgs::parse();
    init_tracing(cli.verbose);

    let path = config_path(cli.config.as_deref());
    let config = load_config(&path)?;
    let transport = SshTransport::from_config(&config.transport);

    match cli.command {
        Command::Status(args) => cmd_status(&config, &transport, args),
        Command::Check(args) => cmd_check(&config, &transport, args),
        Command::Apply(args) => cmd_apply(&config, &transport, args),
        Command::Mark(args) => cmd_mark(&config, &transport, args),
        Command::Tasks(args) => cmd_tasks(&config, args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mledger={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn cmd_status(config: &LedgerConfig, transport: &SshTransport, args: StatusArgs) -> Result<ExitCode> {
    let files = config.discover_migrations()?;
    let mut session = DeploySession::new(config, transport, None, None)?;
    let report = status::list(&mut session, &args.env, &files)?;
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status report")?;
        println!("{text}");
    } else {
        print!("{}", status::render_table(&report, Some(&config.base_dir)));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(config: &LedgerConfig, transport: &SshTransport, args: CheckArgs) -> Result<ExitCode> {
    let mut session = DeploySession::new(config, transport, args.env.as_deref(), None)?;
    let valid = session.is_valid(&args.file)?;
    print_drift(&session);
    println!("{valid}");
    Ok(if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_apply(config: &LedgerConfig, transport: &SshTransport, args: ApplyArgs) -> Result<ExitCode> {
    let files = config.discover_migrations()?;
    let jobs = tasks::load_jobs(&files)?;
    let mut session =
        DeploySession::new(config, transport, args.env.as_deref(), args.version.as_deref())?;
    if session.target_env().is_none() {
        tracing::warn!("no target environment; migration jobs will not run");
    }
    let options = ApplyOptions {
        task: (!args.all_tasks).then(|| args.task.clone()),
        dry_run: args.dry_run,
    };
    let outcome = run_gated_jobs(&mut session, &jobs, &options, &ShellRunner)?;
    print_drift(&session);

    if args.json {
        let text = serde_json::to_string_pretty(&outcome).context("serialize apply outcome")?;
        println!("{text}");
        return Ok(ExitCode::SUCCESS);
    }
    let verb = if args.dry_run { "would run" } else { "ran" };
    for job in &outcome.ran {
        println!("{verb}: {} ({})", job.job, display(config, &job.file));
    }
    println!(
        "{} job(s) {verb}, {} skipped",
        outcome.ran.len(),
        outcome.skipped.len()
    );
    if let Some(sync) = &outcome.sync {
        println!(
            "recorded {} migration(s) on {} ({} total)",
            sync.recorded, sync.env, sync.entries
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_mark(config: &LedgerConfig, transport: &SshTransport, args: MarkArgs) -> Result<ExitCode> {
    let mut session =
        DeploySession::new(config, transport, Some(&args.env), args.version.as_deref())?;
    for file in &args.files {
        if session.is_valid(file)? {
            println!("marked: {}", display(config, file));
        } else {
            println!("already applied: {}", display(config, file));
        }
    }
    print_drift(&session);
    if let Some(sync) = session.update()? {
        println!(
            "recorded {} migration(s) on {} ({} total)",
            sync.recorded, sync.env, sync.entries
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_tasks(config: &LedgerConfig, args: TasksArgs) -> Result<ExitCode> {
    let files = config.discover_migrations()?;
    let jobs = tasks::load_jobs(&files)?;
    let table = tasks::task_table(&jobs);
    let text = if args.json {
        serde_json::to_string_pretty(&table).context("serialize task table")?
    } else {
        serde_yaml::to_string(&table).context("serialize task table")?
    };
    println!("{}", text.trim_end());
    Ok(ExitCode::SUCCESS)
}

fn print_drift(session: &DeploySession<'_>) {
    for notice in session.drift() {
        eprintln!("{}", notice.message());
    }
}

fn display(config: &LedgerConfig, path: &Path) -> String {
    util::display_path(path, Some(&config.base_dir))
}
