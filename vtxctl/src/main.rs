use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = vtxctl::Cli::parse();
    let format = cli.format;
    if let Err(err) = vtxctl::run(cli).await {
        match format {
            vtxctl::OutputFormat::Text => eprintln!("error: {err}"),
            vtxctl::OutputFormat::Json => eprintln!("{}", err.to_json()),
        }
        std::process::exit(1);
    }
}
