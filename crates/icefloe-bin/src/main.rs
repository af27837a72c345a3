#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use icefloe::{tokio, tracing, CONFIG};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod serve;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the database
    Migrate {},
    /// Run the server - The database must be migrated before running the server
    Serve {},
    /// Print the version of the server
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::Migrate {}) => {
            println!("Migrating database...");
            let write_pool =
                icefloe::implementations::postgres::get_writer_pool(
                    icefloe::implementations::postgres::build_pool_opts(),
                )
                .await?;
            icefloe::implementations::postgres::migrate(&write_pool).await?;
            println!("Database migration complete.");
        }
        Some(Commands::Serve {}) => {
            println!("Starting server on {}:{}...", CONFIG.bind_host, CONFIG.listen_port);
            let bind_addr = std::net::SocketAddr::new(
                CONFIG.bind_host.parse()?,
                CONFIG.listen_port,
            );
            serve::serve(bind_addr).await?;
        }
        Some(Commands::Version {}) | None => {
            println!("{VERSION}");
        }
    }

    tracing::debug!("Icefloe terminated");
    Ok(())
}
