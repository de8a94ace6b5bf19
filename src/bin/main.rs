use clap::Parser;
use tracing::info;

use earthring_stream::config::Config;
use earthring_stream::logging;
use earthring_stream::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init(&config);

    info!(port = config.server_port, "starting earthring-streamd");
    let server = Server::new(config);

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
