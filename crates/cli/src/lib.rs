use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "riskstream")]
#[command(about = "RiskStream - live option risk over layered market data subscriptions")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the simulated feed and stream position risk
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "riskstream.yaml", env = "RISKSTREAM_CONFIG")]
        config: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Override the configured log format
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,
    },

    /// Validate configuration without starting the feed
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "riskstream.yaml", env = "RISKSTREAM_CONFIG")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with a working sample
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "riskstream.yaml")]
        output: PathBuf,
    },

    /// Price a single European option and print its risk as JSON
    Price(PriceArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PriceArgs {
    /// Underlying price
    #[arg(long)]
    pub spot: f64,

    #[arg(long)]
    pub strike: f64,

    /// Calendar days to expiry
    #[arg(long)]
    pub expiry_days: i64,

    /// Continuously compounded risk-free rate
    #[arg(long, default_value_t = 0.0)]
    pub rate: f64,

    /// Continuous dividend yield of the underlying
    #[arg(long, default_value_t = 0.0)]
    pub dividend: f64,

    /// Price a put instead of a call
    #[arg(long)]
    pub put: bool,

    /// Annualized volatility
    #[arg(long, conflicts_with = "premium", required_unless_present = "premium")]
    pub vol: Option<f64>,

    /// Observed option premium; volatility is implied from it
    #[arg(long)]
    pub premium: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
