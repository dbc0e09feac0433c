use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use webex_notify_rs::{
    config::{load_dotenv, process_env, resolve},
    CliOverrides, Error, SendOutcome, WebexClient,
};

const EXIT_CONFIG: u8 = 2;
const EXIT_SEND: u8 = 3;
const EXIT_INTERNAL: u8 = 4;

#[derive(Parser, Debug)]
#[command(
    name = "webex-notify",
    version,
    about = "Send a message (and optional attachments) to Cisco Webex"
)]
struct Cli {
    #[arg(short, long, help = "Webex access token (overrides WEBEX_TOKEN)")]
    token: Option<String>,

    #[arg(short, long, help = "Destination roomId or person email (overrides WEBEX_DST)")]
    dst: Option<String>,

    #[arg(short, long, value_parser = ["text", "markdown"], help = "Message format (overrides WEBEX_FORMAT)")]
    format: Option<String>,

    #[arg(long, help = "HTTP timeout in seconds (overrides WEBEX_TIMEOUT)")]
    timeout: Option<f64>,

    #[arg(long, help = "Disable TLS certificate verification (overrides WEBEX_INSECURE)")]
    insecure: bool,

    #[arg(short, long, help = "Verbose output on stderr (overrides WEBEX_VERBOSE)")]
    verbose: bool,

    #[arg(short, long, help = "HTTP proxy URL (overrides WEBEX_PROXY)")]
    proxy: Option<String>,

    #[arg(short, long, help = "Message body to send")]
    message: Option<String>,

    #[arg(long = "file", value_name = "PATH", help = "File to attach; may be repeated")]
    files: Vec<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Read defaults from this file instead of ./.env")]
    env_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            token: self.token.clone(),
            destination: self.dst.clone(),
            format: self.format.clone(),
            timeout_secs: self.timeout,
            insecure: self.insecure,
            verbose: self.verbose,
            proxy: self.proxy.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_dotenv(cli.env_file.as_deref())
        .and_then(|dotenv| resolve(&cli.overrides(), &process_env(), &dotenv))
    {
        Ok(config) => config,
        Err(e) => return ExitCode::from(report(&Error::Config(e))),
    };

    init_logging(config.verbose());
    tracing::debug!(
        destination = %config.destination(),
        format = %config.format(),
        timeout = ?config.timeout(),
        "resolved configuration"
    );

    let client = match WebexClient::new(config) {
        Ok(client) => client,
        Err(e) => return ExitCode::from(report(&e)),
    };

    match client.send(cli.message.as_deref(), cli.files.as_slice()).await {
        Ok(outcome) => {
            if client.config().verbose() {
                print_outcome(&outcome);
            }
            ExitCode::SUCCESS
        }
        Err(e) => ExitCode::from(report(&Error::Send(e))),
    }
}

/// Filter used when `RUST_LOG` is unset. Verbose covers this binary and the library.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,webex_notify=debug,webex_notify_rs=debug"
    } else {
        "warn"
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_outcome(outcome: &SendOutcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => tracing::warn!("failed to render response: {e}"),
    }
}

/// Print `err` to stderr and return the matching exit code.
fn report(err: &Error) -> u8 {
    match err {
        Error::Config(e) => {
            eprintln!("Configuration error: {e}");
            EXIT_CONFIG
        }
        Error::Send(e) => {
            eprintln!("Error: {e}");
            EXIT_SEND
        }
        other => {
            eprintln!("Unexpected error: {other}");
            EXIT_INTERNAL
        }
    }
}
