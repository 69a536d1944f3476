use std::io;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::Parser;
use nixrs_fetch::settings::{DEFAULT_CACHE_URL, DEFAULT_HYDRA_URL, DEFAULT_STORE_DIR};
use nixrs_fetch::wire::DEFAULT_MAX_TOKEN_LEN;
use nixrs_fetch::{HttpFetchClient, Settings};
use tracing::Level;
use tracing_subscriber::prelude::*;

/// Write one file out of the latest build of a Hydra job.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hydra job, e.g. nixos/trunk-combined/nixos.iso_minimal.x86_64-linux
    job: String,

    /// Where to write the file
    output: PathBuf,

    /// Whether to log in JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    log_level: Option<Level>,

    #[arg(long, env = "NIX_FETCH_CACHE_URL", default_value = DEFAULT_CACHE_URL)]
    cache_url: String,

    #[arg(long, env = "NIX_FETCH_HYDRA_URL", default_value = DEFAULT_HYDRA_URL)]
    hydra_url: String,

    #[arg(long, env = "NIX_FETCH_STORE_DIR", default_value = DEFAULT_STORE_DIR)]
    store_dir: String,

    /// Give up after this many seconds, lookups included
    #[arg(long, env = "NIX_FETCH_TIMEOUT")]
    timeout: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKEN_LEN)]
    max_token_len: u64,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            cache_url: self.cache_url.clone(),
            hydra_url: self.hydra_url.clone(),
            store_dir: self.store_dir.clone(),
            timeout: self.timeout.map(Duration::from_secs),
            max_token_len: self.max_token_len,
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = cli.log_level.unwrap_or(Level::INFO);

    let subscriber = tracing_subscriber::registry()
        .with(if cli.json {
            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(io::stderr.with_max_level(level))
                    .json(),
            )
        } else {
            None
        })
        .with(if !cli.json {
            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(io::stderr.with_max_level(level))
                    .pretty(),
            )
        } else {
            None
        });

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global subscriber: {err}");
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("nix-fetch-file: failed to start runtime: {err}");
            exit(1);
        }
    };
    let res = runtime.block_on(async {
        let client = HttpFetchClient::from_settings(cli.settings())?;
        client.extract_file(&cli.job, &cli.output).await
    });

    if let Err(err) = res {
        eprintln!("nix-fetch-file: {err}");
        exit(err.exit_code());
    }
}
