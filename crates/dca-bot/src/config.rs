//! Application configuration.
//!
//! Loaded from a TOML file with `DCA__`-prefixed environment overrides, e.g.
//! `DCA__SYMBOL=ETHUSDT` or `DCA__TAKE_PROFIT__LEVELS=3`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use dca_core::{Category, Symbol};
use dca_orders::{
    ClassifierConfig, FixedPercent, TakeProfitConfig, TakeProfitPercentSource, VolatilityPercent,
};
use dca_resilience::{RecoveryConfig, ResilienceConfig};
use dca_risk::SpacingConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Take-profit ladder settings.
///
/// Ladder shape fields (`levels`, `level_fraction`, batch budget) sit at the
/// top level of the `[take_profit]` table and keep the manager's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeProfitSettings {
    /// Place and maintain the ladder automatically. Default: true.
    #[serde(default = "default_true")]
    pub auto_enabled: bool,
    #[serde(flatten)]
    pub ladder: TakeProfitConfig,
    /// Top-leg distance above the average entry when dynamic sizing is off. Default: 0.02.
    #[serde(default = "default_base_pct")]
    pub base_pct: Decimal,
    /// Derive the top-leg distance from recent volatility. Default: false.
    #[serde(default)]
    pub dynamic_enabled: bool,
    /// Volatility multiplier for the dynamic distance. Default: 3.
    #[serde(default = "default_dynamic_multiplier")]
    pub dynamic_multiplier: Decimal,
    /// Lower clamp for the dynamic distance. Default: 0.005.
    #[serde(default = "default_dynamic_min_pct")]
    pub dynamic_min_pct: Decimal,
    /// Upper clamp for the dynamic distance. Default: 0.08.
    #[serde(default = "default_dynamic_max_pct")]
    pub dynamic_max_pct: Decimal,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_true() -> bool {
    true
}

fn default_base_pct() -> Decimal {
    Decimal::new(2, 2)
}

fn default_dynamic_multiplier() -> Decimal {
    Decimal::from(3)
}

fn default_dynamic_min_pct() -> Decimal {
    Decimal::new(5, 3)
}

fn default_dynamic_max_pct() -> Decimal {
    Decimal::new(8, 2)
}

impl Default for TakeProfitSettings {
    fn default() -> Self {
        Self {
            auto_enabled: true,
            ladder: TakeProfitConfig::default(),
            base_pct: default_base_pct(),
            dynamic_enabled: false,
            dynamic_multiplier: default_dynamic_multiplier(),
            dynamic_min_pct: default_dynamic_min_pct(),
            dynamic_max_pct: default_dynamic_max_pct(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl TakeProfitSettings {
    pub fn manager_config(&self) -> TakeProfitConfig {
        self.ladder.clone()
    }

    /// Fixed or volatility-derived distance, per `dynamic_enabled`.
    pub fn percent_source(&self) -> Box<dyn TakeProfitPercentSource> {
        if self.dynamic_enabled {
            Box::new(VolatilityPercent {
                multiplier: self.dynamic_multiplier,
                min: self.dynamic_min_pct,
                max: self.dynamic_max_pct,
                fallback: self.base_pct,
            })
        } else {
            Box::new(FixedPercent(self.base_pct))
        }
    }
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Cleanup deadline before shutdown is forced (seconds). Default: 30.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
    /// Market-sell the open position during cleanup. Default: true.
    #[serde(default = "default_true")]
    pub flatten_on_shutdown: bool,
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
            flatten_on_shutdown: true,
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Paper venue seed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Default: 100.
    #[serde(default = "default_paper_price")]
    pub initial_price: Decimal,
    /// Quote balance. Default: 10,000.
    #[serde(default = "default_paper_balance")]
    pub quote_balance: Decimal,
}

fn default_paper_price() -> Decimal {
    Decimal::from(100)
}

fn default_paper_balance() -> Decimal {
    Decimal::from(10_000)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_price: default_paper_price(),
            quote_balance: default_paper_balance(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Traded symbol. Default: "BTCUSDT".
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub category: Category,
    /// Loop interval; ticks align to wall-clock multiples of it (seconds). Default: 300.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Quote amount of one entry. Default: 100.
    #[serde(default = "default_base_entry_amount")]
    pub base_entry_amount: Decimal,
    /// Maximum layered entries per position. Default: 10.
    #[serde(default = "default_max_dca_levels")]
    pub max_dca_levels: u32,
    /// Closes fetched per cycle for the gate and dynamic take-profit. Default: 50.
    #[serde(default = "default_kline_limit")]
    pub kline_limit: usize,
    /// Per-call venue deadline (seconds). Default: 30.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Cancel recognised take-profit legs left by a previous run. Default: true.
    #[serde(default = "default_true")]
    pub cancel_orphaned_on_startup: bool,
    /// Consecutive credential failures that halt the bot. Default: 3.
    #[serde(default = "default_max_credential_failures")]
    pub max_credential_failures: u32,
    /// Capacity of the error-reporting queue. Default: 64.
    #[serde(default = "default_error_queue_capacity")]
    pub error_queue_capacity: usize,
    #[serde(default)]
    pub take_profit: TakeProfitSettings,
    #[serde(default)]
    pub spacing: SpacingConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval_secs() -> u64 {
    300
}

fn default_base_entry_amount() -> Decimal {
    Decimal::from(100)
}

fn default_max_dca_levels() -> u32 {
    10
}

fn default_kline_limit() -> usize {
    50
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_credential_failures() -> u32 {
    3
}

fn default_error_queue_capacity() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            category: Category::default(),
            interval_secs: default_interval_secs(),
            base_entry_amount: default_base_entry_amount(),
            max_dca_levels: default_max_dca_levels(),
            kline_limit: default_kline_limit(),
            call_timeout_secs: default_call_timeout_secs(),
            cancel_orphaned_on_startup: true,
            max_credential_failures: default_max_credential_failures(),
            error_queue_capacity: default_error_queue_capacity(),
            take_profit: TakeProfitSettings::default(),
            spacing: SpacingConfig::default(),
            resilience: ResilienceConfig::default(),
            recovery: RecoveryConfig::default(),
            shutdown: ShutdownConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `path` (when present) under `DCA__` environment overrides, then validate.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut builder = Config::builder();
        if Path::new(path).exists() {
            builder = builder.add_source(File::from(Path::new(path)).required(true));
        } else {
            tracing::warn!(path, "Config file not found, using defaults");
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix("DCA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(AppError::Config("symbol must not be empty".into()));
        }
        if self.interval_secs == 0 {
            return Err(AppError::Config("interval_secs must be positive".into()));
        }
        if self.base_entry_amount <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "base_entry_amount must be positive, got {}",
                self.base_entry_amount
            )));
        }
        if self.max_dca_levels == 0 {
            return Err(AppError::Config("max_dca_levels must be at least 1".into()));
        }
        if self.error_queue_capacity == 0 {
            return Err(AppError::Config("error_queue_capacity must be positive".into()));
        }
        if self.take_profit.base_pct <= Decimal::ZERO {
            return Err(AppError::Config("take_profit.base_pct must be positive".into()));
        }
        if self.take_profit.dynamic_min_pct > self.take_profit.dynamic_max_pct {
            return Err(AppError::Config(
                "take_profit.dynamic_min_pct exceeds dynamic_max_pct".into(),
            ));
        }
        self.take_profit.manager_config().validate()?;
        dca_risk::spacing_from_config(&self.spacing)?;
        Ok(())
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbol(), Symbol::new("btcusdt"));
        assert_eq!(config.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            symbol = "ethusdt"
            interval_secs = 60

            [take_profit]
            levels = 4
            level_fraction = "0.25"

            [spacing]
            strategy = "scaled"

            [resilience.trading.breaker]
            failure_threshold = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.symbol().as_str(), "ETHUSDT");
        assert_eq!(config.take_profit.ladder.levels, 4);
        assert_eq!(config.take_profit.ladder.level_fraction, dec!(0.25));
        assert_eq!(config.take_profit.base_pct, dec!(0.02));
        assert_eq!(config.spacing.strategy, "scaled");
        assert_eq!(config.resilience.trading.breaker.failure_threshold, 2);
        assert_eq!(config.max_credential_failures, 3);
    }

    #[test]
    fn test_ladder_defaults_come_from_manager_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [take_profit]
            levels = 3
            level_fraction = "0.3"
            "#,
        )
        .unwrap();
        let defaults = TakeProfitConfig::default();
        let ladder = config.take_profit.manager_config();
        assert_eq!(ladder.levels, 3);
        assert_eq!(ladder.level_fraction, dec!(0.3));
        assert_eq!(ladder.batch_budget_ms, defaults.batch_budget_ms);
        assert_eq!(ladder.safety_margin_ms, defaults.safety_margin_ms);

        let settings = TakeProfitSettings::default();
        assert_eq!(settings.ladder.levels, defaults.levels);
        assert_eq!(settings.ladder.level_fraction, defaults.level_fraction);
    }

    #[test]
    fn test_rejects_overcommitted_ladder() {
        let result = AppConfig::from_toml_str(
            r#"
            [take_profit]
            levels = 5
            level_fraction = "0.3"
            "#,
        );
        assert!(matches!(result, Err(AppError::Orders(_))));
    }

    #[test]
    fn test_rejects_unknown_spacing() {
        let mut config = AppConfig::default();
        config.spacing.strategy = "martingale".into();
        assert!(matches!(config.validate(), Err(AppError::Risk(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.interval_secs = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_percent_source_selection() {
        let mut settings = TakeProfitSettings::default();
        assert_eq!(settings.percent_source().name(), "fixed");
        settings.dynamic_enabled = true;
        assert_eq!(settings.percent_source().name(), "volatility");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("symbol"));
        assert!(toml_str.contains("[take_profit]"));
    }
}
