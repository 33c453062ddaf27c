#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Protocol host contract (callAgreement entry point)
    pub host_address: String,
    /// Constant flow agreement contract
    pub cfa_address: String,
    /// Gas price floor for the first submission attempt, in price units
    pub gas_price: u64,
    /// Submission timeout before a same-nonce resend
    pub submission_timeout_ms: u64,
    /// Retry budget per logical remediation send
    pub max_submit_retries: u32,
    /// Multiplicative gas escalation step per retry
    pub gas_escalation_step: f64,
    /// Seconds between remediation passes
    pub pass_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/sentinel".to_string()),
            host_address: std::env::var("HOST_ADDRESS")
                .map_err(|_| config::ConfigError::Message("HOST_ADDRESS must be set".into()))?,
            cfa_address: std::env::var("CFA_ADDRESS")
                .map_err(|_| config::ConfigError::Message("CFA_ADDRESS must be set".into()))?,
            gas_price: parse_env("GAS_PRICE", 10)?,
            submission_timeout_ms: parse_env("TIMEOUT_MS", 60_000)?,
            max_submit_retries: parse_env("MAX_SUBMIT_RETRIES", 10)?,
            gas_escalation_step: parse_env("GAS_ESCALATION_STEP", 0.15)?,
            pass_interval_secs: parse_env("PASS_INTERVAL_SECS", 86_400)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| config::ConfigError::Message(format!("invalid value for {}", name))),
        Err(_) => Ok(default),
    }
}
