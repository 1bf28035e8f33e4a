mod client;
mod config;
mod error;
mod logger;
mod terminal;

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use client::DebugClient;
use config::ClientConfig;
use error::{Error, Result};
use logger::init_logging;
use rs_debug::protocol::HandshakeMessage;
use terminal::{Tty, term_type};

const WRONG_PORT_HINT: &str = "Connection refused - did you use the right port?";

/// Terminal client for rs_debug sessions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach this terminal to a waiting debug session
    Debug {
        /// Address the session listens on
        ip: String,

        /// Port the session listens on
        port: u16,

        /// Seconds to wait for the connection, fractions allowed
        #[arg(short, long, value_parser = parse_timeout)]
        timeout: Option<Duration>,
    },
}

fn parse_timeout(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{value:?} is not a number: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{value:?} is not a usable timeout: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Connect(e)) if e.is_wrong_port() => {
            tracing::debug!("{}", e);
            eprintln!("{WRONG_PORT_HINT}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.debug)?;
    let config = ClientConfig::load(cli.config)?;

    let Command::Debug { ip, port, timeout } = cli.command;
    let timeout = timeout.unwrap_or(config.connect.timeout());

    let tty = Tty::open()?;
    let mut client = DebugClient::connect(&ip, port, timeout).await?;

    let hello = HandshakeMessage::new(tty.attrs()?, term_type(config.term_type.as_deref()), tty.size());
    client.handshake(&hello).await?;

    let _raw = tty.raw_mode()?;
    client.run(&tty).await
}
