use crate::*;
use anyhow::{Context, Result};
use chrono::Duration;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RiskStreamConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    let config = load_config_str(&content)?;
    info!(
        instruments = config.instruments.len(),
        positions = config.positions.len(),
        "Configuration loaded successfully"
    );
    Ok(config)
}

/// Parse configuration text after environment substitution
pub fn load_config_str(content: &str) -> Result<RiskStreamConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    serde_yaml::from_str(&substituted).with_context(|| "Failed to parse YAML configuration")
}

/// A working sample: SPX with a call quoted in volatility and a put
/// quoted in premium, expiring ninety days out.
#[instrument]
pub fn generate_default_config() -> RiskStreamConfig {
    use defaults::*;

    let expiry = Utc::now().date_naive() + Duration::days(90);

    let mut call = InstrumentConfig::european_option("SPX-C", "SPX", 7275.0, expiry, OptionType::Call);
    call.quote = DatumKind::Volatility;
    let put = InstrumentConfig::european_option("SPX-P", "SPX", 7275.0, expiry, OptionType::Put);
    let mut spx = InstrumentConfig::linear("SPX");
    spx.feed_symbol = Some(".SPX".to_string());

    RiskStreamConfig {
        service: ServiceConfig::default(),
        pricing: PricingConfig {
            risk_free_rate: 0.0025,
            dividend_yields: BTreeMap::from([("SPX".to_string(), 0.02)]),
        },
        instruments: vec![spx, call, put],
        feed: FeedConfig {
            tick_interval_ms: default_tick_interval_ms(),
            step_fraction: default_step_fraction(),
            spread_fraction: default_spread_fraction(),
            seed_prices: BTreeMap::from([
                (".SPX".to_string(), 7275.0),
                ("SPX-C".to_string(), 0.10),
                ("SPX-P".to_string(), 150.0),
            ]),
            rng_seed: None,
        },
        store: StoreConfig {
            snapshot: BTreeMap::from([
                (
                    "SPX".to_string(),
                    SnapshotEntry {
                        value: 7275.0,
                        kind: DatumKind::Price,
                    },
                ),
                (
                    "SPX-C".to_string(),
                    SnapshotEntry {
                        value: 0.10,
                        kind: DatumKind::Volatility,
                    },
                ),
                (
                    "SPX-P".to_string(),
                    SnapshotEntry {
                        value: 150.0,
                        kind: DatumKind::Price,
                    },
                ),
            ]),
        },
        positions: vec![
            PositionConfig {
                instrument: "SPX-C".to_string(),
                size: 10.0,
                open_price: 140.0,
            },
            PositionConfig {
                instrument: "SPX-P".to_string(),
                size: -5.0,
                open_price: 150.0,
            },
            PositionConfig {
                instrument: "SPX".to_string(),
                size: 1.0,
                open_price: 7250.0,
            },
        ],
        logging: LoggingConfig::default(),
        metrics: MetricsConfig::default(),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &RiskStreamConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_instruments() {
        let config = generate_default_config();
        let instruments = config.instruments().unwrap();
        assert_eq!(instruments.len(), 3);
        assert_eq!(instruments[0].feed_symbol(), ".SPX");
        assert_eq!(instruments[1].quote, DatumKind::Volatility);
        assert_eq!(instruments[2].quote, DatumKind::Price);
        assert_eq!(config.snapshot().len(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "riskstream-config-{}.yaml",
            std::process::id()
        ));
        let config = generate_default_config();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.instruments.len(), config.instruments.len());
        assert_eq!(loaded.positions.len(), 3);
        assert_eq!(loaded.feed.seed_prices[".SPX"], 7275.0);
        assert_eq!(loaded.instruments[1].expiry, config.instruments[1].expiry);
        assert!(validate_config(&loaded).is_valid());
    }

    #[test]
    fn test_load_config_substitutes_env_vars() {
        std::env::set_var("RISKSTREAM_TEST_RATE", "0.05");
        let config = load_config_str(
            "pricing:\n  risk_free_rate: ${RISKSTREAM_TEST_RATE}\ninstruments:\n  - key: ES\n    kind: linear\n",
        )
        .unwrap();
        assert_eq!(config.pricing.risk_free_rate, 0.05);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load_config("/nonexistent/riskstream.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
