use anyhow::Result;
use as400_mcp::{cli, config::Config, mcp, rpc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing();

    let config = Config::from_env();
    let app = rpc::App::new(config)?;

    match args.command {
        cli::Command::McpServe => mcp::serve(app),
        cli::Command::Serve => rpc::serve(app),
        cli::Command::Request {
            method,
            params,
            params_file,
            id,
        } => {
            let params_raw = if let Some(path) = params_file {
                std::fs::read_to_string(&path)?
            } else {
                params
            };
            let response = rpc::call(&app, method, &params_raw, &id)?;
            println!("{response}");
            Ok(())
        }
    }
}

// stdout carries the protocol; all diagnostics go to stderr.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
