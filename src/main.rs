//! `pmix-probe`: connect to a management server and send one command.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, CommandArg};
use pmix_link::{
    ClientBuilder,
    ClientError,
    ServerAddress,
    frame::ProcessId,
    payload::{CommandTag, Payload},
};

fn command_tag(arg: CommandArg) -> CommandTag {
    match arg {
        CommandArg::Abort => CommandTag::Abort,
        CommandArg::Fence => CommandTag::Fence,
        CommandArg::Put => CommandTag::Put,
        CommandArg::Get => CommandTag::Get,
        CommandArg::GetAttr => CommandTag::GetAttr,
        CommandArg::Publish => CommandTag::Publish,
        CommandArg::Lookup => CommandTag::Lookup,
        CommandArg::Unpublish => CommandTag::Unpublish,
        CommandArg::Finalize => CommandTag::Finalize,
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let mut builder = ClientBuilder::new()
        .identity(ProcessId::new(cli.identity))
        .max_retries(cli.retries);
    if let Some(uri) = cli.uri.as_deref() {
        builder = builder.address(ServerAddress::from_uri(uri)?);
    } else if let Some(path) = cli.socket {
        builder = builder.address(ServerAddress::new(path));
    }

    let mut payload = Payload::new(command_tag(cli.command));
    for field in &cli.fields {
        payload
            .append_str(field)
            .map_err(|err| ClientError::InvalidConfiguration {
                reason: err.to_string(),
            })?;
    }

    let (client, progress) = builder.spawn_progress_thread()?;
    client.connect_blocking()?;
    let reply = client.call_blocking(payload.freeze());
    client.finalize_blocking()?;
    if progress.join().is_err() {
        tracing::error!("progress thread panicked");
    }

    let reply = reply?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("pmix-probe: {err}");
            ExitCode::FAILURE
        }
    }
}
