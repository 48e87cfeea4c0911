use breakthrough::Config;
use breakthrough::web::run_server;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("Breakthrough - Hot-seat Edition");
    println!("===============================");
    println!();

    run_server(config).await
}
