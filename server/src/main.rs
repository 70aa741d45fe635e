use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::DEFAULT_PORT;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then runs the server until ctrl-c.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Tick rate (state-processing passes per second)
        #[clap(short, long, default_value = "50")]
        tick_rate: u32,
        /// Delay between roster snapshot and id assignment, in milliseconds
        #[clap(long, default_value = "200")]
        join_grace_ms: u64,
    }

    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        tick_interval: Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32),
        join_grace: Duration::from_millis(args.join_grace_ms),
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("server loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
