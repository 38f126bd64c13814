use saltsum::client::Client;
use saltsum::config::{Command, Config, VectorArg};
use saltsum::server::Server;
use saltsum::worker::Side;
use std::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &config.command {
        Command::Serve => run_server(&config),
        Command::Send { connect, vectors } => run_send(&config, connect, vectors),
    }
}

/// Accept connections until the process is stopped
fn run_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        side = ?config.side,
        element_type = %config.element_type,
        hash = ?config.hash,
        read_strategy = %config.read_strategy,
        buffer_size = config.buffer_size,
        "Starting saltsum worker"
    );
    Server::new(config).run()?;
    Ok(())
}

/// Submit one batch to a running worker and print the sums
fn run_send(
    config: &Config,
    connect: &str,
    vectors: &[VectorArg],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(connect)?;
    info!(peer = %connect, vectors = vectors.len(), "Connected");

    let client = Client::new(config.credential.clone(), config.hash);
    if config.side == Side::Server {
        client.authenticate(&mut stream)?;
    }

    let batch: Vec<Vec<i64>> = vectors.iter().map(|v| v.0.clone()).collect();
    let sums = client.submit_batch::<i64>(&mut stream, &batch)?;
    for sum in sums {
        println!("{sum}");
    }
    Ok(())
}
