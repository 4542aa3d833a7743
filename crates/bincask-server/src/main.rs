//! Bincask CLI
//!
//! `bincask serve --dir ./data --bins 512 --listen 127.0.0.1:6380`
//! `bincask repl --dir ./data --bins 512`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::Level;

use bincask_core::{BincaskEngine, Config, Mode};
use bincask_server::{repl, server};

#[derive(Parser)]
#[command(name = "bincask")]
#[command(about = "Sharded, disk-persistent key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the wire protocol over TCP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:6380")]
        listen: String,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Interactive REPL against a local store
    Repl {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Store directory
    #[arg(short, long, default_value = "data")]
    dir: PathBuf,

    /// Number of bins (must match the value the store was created with)
    #[arg(short, long, default_value_t = 512)]
    bins: usize,

    /// Wipe the directory and create a fresh store instead of opening
    #[arg(long)]
    create: bool,
}

impl StoreArgs {
    fn open(&self) -> Result<Arc<BincaskEngine>> {
        let mode = if self.create { Mode::Create } else { Mode::Open };
        let engine = BincaskEngine::open(&self.dir, self.bins, mode, Config::default())?;
        Ok(Arc::new(engine))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, store } => {
            let engine = store.open()?;
            let listener = TcpListener::bind(&listen).await?;
            server::serve(listener, engine).await?;
        }
        Commands::Repl { store } => {
            let engine = store.open()?;
            repl::run(engine)?;
        }
    }

    Ok(())
}
