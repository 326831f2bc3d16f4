use common::DatumKind;

pub fn default_service_name() -> String {
    "riskstream".to_string()
}

pub fn default_report_interval_secs() -> u64 {
    5
}

pub fn default_quote() -> DatumKind {
    DatumKind::Price
}

pub fn default_tick_interval_ms() -> u64 {
    250
}

pub fn default_step_fraction() -> f64 {
    0.001
}

pub fn default_spread_fraction() -> f64 {
    0.0002
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}
