use std::ffi::OsString;

use clap::{CommandFactory, FromArgMatches};
use tracing::debug;

use loadtest::app::{run_client, run_server};
use loadtest::args::{Command, LoadtestArgs};
use loadtest::config::types::ConfigFile;
use loadtest::config::{load_config, resolve_client, resolve_server};
use loadtest::error::AppResult;

pub(crate) fn run() -> AppResult<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    crate::logger::init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_async(args, config.as_ref()))
}

fn parse_args() -> AppResult<Option<LoadtestArgs>> {
    let mut cmd = LoadtestArgs::command();
    let raw_args: Vec<OsString> = std::env::args_os().collect();

    if should_show_help(&raw_args) {
        cmd.print_help()?;
        println!();
        return Ok(None);
    }

    let matches = cmd.get_matches_from(raw_args);
    let args = LoadtestArgs::from_arg_matches(&matches)?;

    Ok(Some(args))
}

fn should_show_help(raw_args: &[OsString]) -> bool {
    matches!(raw_args, [] | [_]) || matches!(raw_args, [_, second] if second == "--")
}

async fn run_async(args: LoadtestArgs, config: Option<&ConfigFile>) -> AppResult<()> {
    match args.command {
        Command::Server(server_args) => {
            let server_config = resolve_server(&server_args, config)?;
            debug!(?server_config, "resolved server settings");
            run_server(server_config).await
        }
        Command::Client(client_args) => {
            let settings = resolve_client(&client_args, config)?;
            debug!(?settings, "resolved client settings");
            run_client(settings).await?;
            Ok(())
        }
    }
}
