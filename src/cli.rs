//! Command line interface for the `pmix-probe` binary.
//!
//! The probe connects to a management server, sends one command and prints
//! the reply. It is meant for checking that a server is reachable and
//! answering.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command line arguments for `pmix-probe`.
#[derive(Debug, Parser)]
#[command(
    name = "pmix-probe",
    version,
    about = "Send one command to a process-management server"
)]
pub struct Cli {
    /// Server URI as `<server-id>:<socket-path>`.
    #[arg(short, long, env = "PMIX_SERVER_URI", conflicts_with = "socket")]
    pub uri: Option<String>,

    /// Socket path, accepting any server identity.
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Identity to present to the server.
    #[arg(short, long, env = "PMIX_ID", default_value_t = 0)]
    pub identity: u64,

    /// Connect retries after the first failed attempt.
    #[arg(short, long, env = "PMIX_MAX_RETRIES", default_value_t = 3)]
    pub retries: u32,

    /// Command to send.
    #[arg(value_enum)]
    pub command: CommandArg,

    /// String fields appended to the command payload.
    pub fields: Vec<String>,
}

/// Commands the probe can send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommandArg {
    Abort,
    Fence,
    Put,
    Get,
    GetAttr,
    Publish,
    Lookup,
    Unpublish,
    Finalize,
}
