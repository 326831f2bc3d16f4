//! RiskStream CLI and live risk binary
//!
//! Entry point for initializing, validating and running the layered
//! market-data / risk / position services, plus one-shot option pricing.

mod app;
mod shutdown;

use anyhow::{Context, Result};
use app::App;
use chrono::{Duration as ChronoDuration, Utc};
use cli::{Cli, Commands, LogFormat as CliLogFormat, PriceArgs};
use common::{DatumKind, Instrument, MarketDatum, OptionType};
use config::{generate_default_config, load_config, save_config, validate_config, RiskStreamConfig};
use observability::{init_logging, init_metrics, LogFormat};
use pricing::{compute_risk, MarketBundle, PricingContext};
use shutdown::ShutdownController;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run {
            config,
            duration_secs,
            log_format,
        } => run_command(config, duration_secs, log_format).await,
        Commands::Validate { config } => {
            init_logging("riskstream", LogFormat::Compact)?;
            validate_command(config)
        }
        Commands::Init { output } => {
            init_logging("riskstream", LogFormat::Compact)?;
            init_command(output)
        }
        Commands::Price(args) => price_command(&args),
    }
}

/// Log warnings and fail on validation errors
fn ensure_valid(config: &RiskStreamConfig) -> Result<()> {
    let report = validate_config(config);

    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    for default in &report.defaults_applied {
        debug!(field = %default.field, value = %default.value, "Default applied");
    }

    if !report.is_valid() {
        error!(
            error_count = report.errors.len(),
            "Configuration validation failed"
        );
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start due to configuration errors");
    }

    Ok(())
}

async fn run_command<P: AsRef<Path>>(
    config_path: P,
    duration_secs: Option<u64>,
    log_format: Option<CliLogFormat>,
) -> Result<()> {
    let config_path = config_path.as_ref();

    let config = load_config(config_path)?;
    let format = match log_format {
        Some(CliLogFormat::Pretty) => LogFormat::Pretty,
        Some(CliLogFormat::Json) => LogFormat::Json,
        Some(CliLogFormat::Compact) => LogFormat::Compact,
        None => LogFormat::parse(&config.logging.format).unwrap_or_default(),
    };
    init_logging(&config.service.name, format)?;
    ensure_valid(&config)?;
    info!(
        service = %config.service.name,
        instruments = config.instruments.len(),
        positions = config.positions.len(),
        "RiskStream starting"
    );

    if config.metrics.enabled {
        init_metrics(config.metrics.port).context("Failed to start metrics exporter")?;
    }

    let app = App::build(&config)?;

    let shutdown = ShutdownController::with_ctrl_c();
    if let Some(secs) = duration_secs {
        shutdown.cancel_after(Duration::from_secs(secs));
    }

    app.run(shutdown.child_token()).await;
    shutdown.shutdown();

    info!(positions = app.positions().len(), "RiskStream stopping");
    app.report();
    app.shutdown();
    info!("RiskStream stopped");
    Ok(())
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Valuation date: {}", config.valuation_date());
    println!("Instruments: {}", config.instruments.len());
    println!("Positions: {}", config.positions.len());

    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("This configuration includes:");
    println!("  - SPX index with a call quoted in volatility and a put quoted in premium");
    println!("  - A read-through snapshot so positions price before the first tick");
    println!("  - Three sample positions");
    println!();
    println!("Next steps:");
    println!(
        "  1. Run 'riskstream validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  2. Run 'riskstream run --config {:?}' to stream risk",
        output_path
    );

    Ok(())
}

/// Price one option through the same path the risk layer uses
fn price_command(args: &PriceArgs) -> Result<()> {
    let valuation_date = Utc::now().date_naive();
    let expiry = valuation_date + ChronoDuration::days(args.expiry_days);
    let option_type = if args.put { OptionType::Put } else { OptionType::Call };

    let (own, quote) = match (args.vol, args.premium) {
        (Some(vol), _) => (MarketDatum::volatility(vol), DatumKind::Volatility),
        (None, Some(premium)) => (MarketDatum::price(premium), DatumKind::Price),
        (None, None) => anyhow::bail!("Either --vol or --premium is required"),
    };

    let instrument =
        Instrument::european_option("OPTION", "UNDERLYING", args.strike, expiry, option_type)
            .quoted_in(quote);
    let context = PricingContext::new(valuation_date, args.rate)
        .with_dividend_yield("UNDERLYING", args.dividend);
    let bundle = MarketBundle::derivative(own, MarketDatum::price(args.spot));

    let risk = compute_risk(&instrument, &bundle, &context).context("Pricing failed")?;
    println!("{}", serde_json::to_string_pretty(&risk)?);
    Ok(())
}
