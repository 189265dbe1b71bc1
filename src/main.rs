//! tasktrail CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tt::cli::commands;
use tt::cli::{Cli, Commands};
use tt::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        tt::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor TT_LOG if set, otherwise use verbosity flag
    let filter = if let Ok(spec) = std::env::var("TT_LOG") {
        EnvFilter::new(spec)
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let actor = commands::resolve_actor(cli.actor, cli.anon_email.as_deref(), cli.token.as_deref());

    match &cli.command {
        Commands::Init { force } => commands::init::execute(cli.db.as_ref(), *force, json),
        Commands::Version => commands::version::execute(json),

        Commands::Project { command } => {
            commands::project::execute(command, cli.db.as_ref(), json)
        }
        Commands::Category { command } => {
            commands::category::execute(command, cli.db.as_ref(), actor.id, json)
        }
        Commands::User { command } => {
            commands::user::execute(command, cli.db.as_ref(), &actor, json)
        }
        Commands::Grant {
            user,
            capability,
            project,
        } => commands::grant::execute_grant(*user, capability, *project, cli.db.as_ref(), json),
        Commands::Revoke {
            user,
            capability,
            project,
        } => commands::grant::execute_revoke(*user, capability, *project, cli.db.as_ref(), json),

        Commands::Task { command } => {
            commands::task::execute(command, cli.db.as_ref(), &actor, json)
        }
        Commands::Comment { task, text, file } => {
            commands::comment::execute(*task, text, file, cli.db.as_ref(), &actor, json)
        }
        Commands::Attach { command } => {
            commands::attach::execute(command, cli.db.as_ref(), &actor, json)
        }
        Commands::Watch { tasks, user, force } => {
            commands::watch::execute_watch(tasks, *user, *force, cli.db.as_ref(), &actor, json)
        }
        Commands::Unwatch { tasks, user } => {
            commands::watch::execute_unwatch(tasks, *user, cli.db.as_ref(), &actor, json)
        }

        Commands::List(args) => commands::list::execute(args, cli.db.as_ref(), &actor, json),
        Commands::History { task, limit } => {
            commands::history::execute(*task, *limit, cli.db.as_ref(), json)
        }

        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
