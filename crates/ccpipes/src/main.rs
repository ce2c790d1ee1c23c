mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_json);
    cli.global.apply_defaults(&config::load_config_or_default().defaults);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so command output on stdout stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;
    tracing::debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Apply(args) => commands::apply::handle(&args, global),
        Command::Diff(args) => commands::diff::handle(&args, global),
        Command::Combine(args) => commands::combine::handle(args, global),
        Command::Groups(args) => commands::groups::handle(&args, global),
        Command::Connect(args) => commands::connect::handle(&args, global).await,
        Command::Config(args) => commands::config_cmd::handle(args, global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "ccpipes", &mut std::io::stdout());
            Ok(())
        }
    }
}
