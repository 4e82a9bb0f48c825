use std::os::unix::process::CommandExt;
use std::path::PathBuf;

use clap::Parser;
use sshdo_core::{AuditRecord, AuditSink, SystemUserDb, UserDb};
use sshdo_learn::DriverOptions;
use sshdo_policy::DEFAULT_CONFIG_PATH;

use sshdo::{evaluate, run_check, session, SessionAction, SessionRequest, SyslogSink};

/// Policy gatekeeper for incoming remote shell sessions.
///
/// With no mode flag, runs as the forced command of an ssh key: decides
/// whether the requested command is permitted, logs the decision, and
/// replaces itself with the user's login shell. The mode flags replay the
/// policy and its audit trail offline.
#[derive(Parser, Debug)]
#[command(name = "sshdo", version, about, long_about = None)]
struct Cli {
    /// Path to the policy file
    #[arg(short = 'C', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Check policy files and report problems
    #[arg(
        short = 'c',
        long = "check",
        value_name = "FILE",
        num_args = 0..,
        conflicts_with_all = ["learn", "unlearn"]
    )]
    check: Option<Vec<PathBuf>>,

    /// Propose directives covering logged training usage
    #[arg(
        short = 'l',
        long = "learn",
        value_name = "LOGFILE",
        num_args = 0..,
        conflicts_with = "unlearn"
    )]
    learn: Option<Vec<PathBuf>>,

    /// Re-emit the policy with unused directives commented out
    #[arg(short = 'u', long = "unlearn", value_name = "LOGFILE", num_args = 0..)]
    unlearn: Option<Vec<PathBuf>>,

    /// Treat disallowed records as acceptable usage
    #[arg(short = 'a', long = "accepting")]
    accepting: bool,

    /// Key label for the forced-command invocation
    label: Option<String>,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sshdo=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| std::env::var_os("SSHDO_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    if cli.accepting && cli.learn.is_none() && cli.unlearn.is_none() {
        eprintln!("error: --accepting requires --learn or --unlearn");
        return 1;
    }

    let config = config_path(&cli);
    let users = SystemUserDb::new();

    if let Some(files) = cli.check {
        let files = if files.is_empty() { vec![config] } else { files };
        return match run_check(&files, &users, &mut std::io::stdout().lock()) {
            Ok(count) => count.min(255) as i32,
            Err(e) => {
                eprintln!("error: {}", e);
                1
            }
        };
    }

    if let Some(files) = cli.learn {
        return run_miner(&config, &users, files, cli.accepting, Miner::Learn);
    }
    if let Some(files) = cli.unlearn {
        return run_miner(&config, &users, files, cli.accepting, Miner::Unlearn);
    }

    run_session(&config, &users, cli.label.as_deref())
}

enum Miner {
    Learn,
    Unlearn,
}

fn run_miner(
    config: &std::path::Path,
    users: &dyn UserDb,
    log_files: Vec<PathBuf>,
    accepting: bool,
    miner: Miner,
) -> i32 {
    let loaded = sshdo_policy::load(config);
    for issue in &loaded.issues {
        tracing::warn!("{}", issue.describe());
    }
    let options = DriverOptions {
        accepting,
        log_files,
    };
    let mut out = std::io::stdout().lock();
    let result = match miner {
        Miner::Learn => sshdo_learn::learn(&loaded, users, &options, &mut out),
        Miner::Unlearn => sshdo_learn::unlearn(&loaded, users, &options, &mut out),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

fn run_session(config: &std::path::Path, users: &dyn UserDb, label: Option<&str>) -> i32 {
    let request = match SessionRequest::from_env(label) {
        Ok(request) => request,
        Err(message) => {
            eprintln!("error: {}", message);
            return 1;
        }
    };

    let loaded = sshdo_policy::load(config);
    let sink = SyslogSink::new(loaded.settings.facility);
    for issue in &loaded.issues {
        if let Some(record) = issue.runtime_record() {
            emit(&sink, &record);
        }
    }

    match evaluate(&loaded, &request, users, &sink) {
        SessionAction::Exec(plan) => {
            let error = std::process::Command::new(&plan.shell)
                .arg0(&plan.arg0)
                .args(&plan.args)
                .exec();
            // exec only returns on failure
            emit(
                &sink,
                &AuditRecord::new("execerror")
                    .field("command", request.command.clone())
                    .field("error", error.to_string()),
            );
            eprintln!("error: {}: {}", plan.shell.display(), error);
            1
        }
        SessionAction::Deny => {
            session::show_banner(&loaded.settings, &sink, &mut std::io::stdout().lock());
            1
        }
        SessionAction::Fail => 1,
    }
}

fn emit(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(e) = sink.emit(record) {
        tracing::warn!("audit record not delivered: {}", e);
    }
}
