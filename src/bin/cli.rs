//! logkv CLI Client
//!
//! Command-line interface for interacting with a logkv server.

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use logkv::network::Client;

/// logkv CLI
#[derive(Parser, Debug)]
#[command(name = "logkv-cli")]
#[command(about = "CLI for the logkv key-value store")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8083")]
    server: String,

    /// Socket read/write timeout in milliseconds (0 waits forever)
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Ping the server
    Ping,

    /// Write the current Unix timestamp under a key, retrying until the
    /// server is reachable
    Bootstrap {
        /// Key identifying the deployment
        key: String,

        /// Attempts before giving up
        #[arg(long, default_value = "10")]
        retries: u32,

        /// Delay before the first retry, doubled after each failure
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let timeout = (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms));

    match run(&args.server, timeout, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(server: &str, timeout: Option<Duration>, command: Commands) -> logkv::Result<()> {
    match command {
        Commands::Get { key } => match connect(server, timeout)?.get(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(not found)"),
        },
        Commands::Set { key, value } => {
            connect(server, timeout)?.put(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Ping => {
            connect(server, timeout)?.ping()?;
            println!("PONG");
        }
        Commands::Bootstrap {
            key,
            retries,
            interval_ms,
        } => bootstrap(
            server,
            timeout,
            &key,
            retries,
            Duration::from_millis(interval_ms),
        )?,
    }

    Ok(())
}

fn connect(server: &str, timeout: Option<Duration>) -> logkv::Result<Client> {
    let client = Client::connect(server)?;
    client.set_timeout(timeout)?;
    Ok(client)
}

fn bootstrap(
    server: &str,
    timeout: Option<Duration>,
    key: &str,
    retries: u32,
    interval: Duration,
) -> logkv::Result<()> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string();

    let mut delay = interval;
    let mut attempt = 1;
    loop {
        let result =
            connect(server, timeout).and_then(|mut client| client.put(key, timestamp.as_bytes()));
        match result {
            Ok(()) => {
                println!("Initialized {} = {}", key, timestamp);
                return Ok(());
            }
            Err(e) if attempt < retries => {
                eprintln!("attempt {}/{} failed: {}", attempt, retries, e);
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
