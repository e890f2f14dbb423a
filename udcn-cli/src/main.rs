use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

/// µDCN Command Line Interface
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Management TCP socket address
    #[clap(long, global = true, default_value = "127.0.0.1:9001")]
    management: String,

    /// Forwarder UDP data socket address
    #[clap(long, global = true, default_value = "127.0.0.1:9000")]
    server: String,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a peer address as a face
    NewFace {
        /// Address of the peer, e.g. 127.0.0.1:9100
        addr: String,
    },

    /// Add a forwarding rule to the FIB
    NewForwardingRule {
        /// Name prefix (NDN URI format)
        prefix: String,

        /// Next-hop face id
        face: u32,
    },

    /// Insert Content directly into the Content Store
    NewContent {
        /// Name to publish under (NDN URI format)
        name: String,

        /// Content to publish (string)
        content: String,
    },

    /// Shut the forwarder down
    Shutdown,

    /// Send an Interest and print the Content/Nack response
    Interest {
        /// Name to request (NDN URI format)
        name: String,

        /// Timeout in milliseconds
        #[clap(short, long, default_value = "4000")]
        timeout: u64,
    },

    /// Register as a producer and answer Interests for a name
    Publish {
        /// Name to publish under (NDN URI format)
        name: String,

        /// Content to publish (string)
        content: String,

        /// Local address to listen on and advertise to the forwarder
        #[clap(short, long, default_value = "127.0.0.1:0")]
        advertise: String,
    },

    /// Benchmark the forwarder
    Benchmark {
        /// Number of Interests to send
        #[clap(short, long, default_value = "1000")]
        count: usize,

        /// Name prefix to use for benchmark
        #[clap(short, long, default_value = "/benchmark")]
        prefix: String,

        /// Number of concurrent requests
        #[clap(short, long, default_value = "1")]
        concurrent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    match cli.command {
        Commands::NewFace { addr } => {
            commands::management::new_face(cli.management, addr).await?;
        }
        Commands::NewForwardingRule { prefix, face } => {
            commands::management::new_forwarding_rule(cli.management, prefix, face).await?;
        }
        Commands::NewContent { name, content } => {
            commands::management::new_content(cli.management, name, content).await?;
        }
        Commands::Shutdown => {
            commands::management::shutdown(cli.management).await?;
        }
        Commands::Interest { name, timeout } => {
            commands::interest::send_interest(name, timeout, cli.server).await?;
        }
        Commands::Publish { name, content, advertise } => {
            commands::publish::publish_data(name, content, cli.management, advertise).await?;
        }
        Commands::Benchmark { count, prefix, concurrent } => {
            commands::benchmark::run_benchmark(count, prefix, concurrent, cli.server).await?;
        }
    }

    Ok(())
}
