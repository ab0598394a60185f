mod app;
mod cli;
mod server;
mod telemetry;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::app::App;
use crate::cli::Args;
use crate::telemetry::init_telemetry;

// Exit codes: 0 success, 1 generic failure, 2 configuration error,
// 3 persistent LLM unavailability during the smoke test.
const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_LLM_UNAVAILABLE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = init_telemetry(&args) {
        eprintln!("failed to initialize telemetry: {:#}", e);
        return ExitCode::from(EXIT_CONFIG);
    }

    info!("starting docview server");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let app = match App::build(args.clone()).await {
        Ok(app) => app,
        Err(e) => {
            error!("startup failed: {:#}", e);
            return ExitCode::from(if e.is_config_error() {
                EXIT_CONFIG
            } else {
                EXIT_FAILURE
            });
        }
    };

    if args.smoke_test {
        return match app.smoke_test().await {
            Ok(()) => {
                info!("smoke test passed");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("smoke test failed: {:#}", e);
                ExitCode::from(EXIT_LLM_UNAVAILABLE)
            }
        };
    }

    match app.run().await {
        Ok(()) => {
            info!("server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert()
    }
}
