//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "docview-server",
    about = "docview document summarization server",
    version,
    long_about = "Ingests IT learning documents, classifies them across the \
                  learning, qa, and system views, and produces per-view \
                  structured summaries through a chat LLM."
)]
pub struct Args {
    /// HTTP server port (overrides configuration)
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Enable JSON log format (useful for production)
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Ping the configured LLM once and exit (exit code 3 on failure)
    #[arg(long)]
    pub smoke_test: bool,
}
