use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetforge::cli::{self, Cli};
use fleetforge::core;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let verbose = args.verbose;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "fleetforge=debug" } else { "fleetforge=warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if let Err(err) = cli::execute(args).await {
        core::report_failure(&err, verbose);
        std::process::exit(1);
    }
}
