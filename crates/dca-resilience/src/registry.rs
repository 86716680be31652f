//! Process-wide registry of breakers and limiters.
//!
//! Breakers and limiters are shared by name: asking twice for the same name
//! returns the same instance, so every caller of a given operation class
//! observes one state machine and one token budget.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, StateChangeObserver,
};
use crate::rate_limiter::{TokenBucket, TokenBucketConfig};

/// Venue operation classes, each with its own breaker and limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Order placement and cancellation.
    Trading,
    /// Prices, klines, instrument constraints.
    MarketData,
    /// Positions, open orders, balances.
    AccountData,
}

impl OperationClass {
    pub const ALL: [OperationClass; 3] = [Self::Trading, Self::MarketData, Self::AccountData];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trading => "trading",
            Self::MarketData => "market_data",
            Self::AccountData => "account_data",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker and limiter settings for one class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub limiter: TokenBucketConfig,
}

/// Per-class resilience settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_trading")]
    pub trading: ClassConfig,
    #[serde(default = "default_market_data")]
    pub market_data: ClassConfig,
    #[serde(default)]
    pub account_data: ClassConfig,
}

fn default_trading() -> ClassConfig {
    ClassConfig {
        breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            ..CircuitBreakerConfig::default()
        },
        limiter: TokenBucketConfig {
            capacity: 5,
            refill_per_sec: 5,
        },
    }
}

fn default_market_data() -> ClassConfig {
    ClassConfig {
        breaker: CircuitBreakerConfig::default(),
        limiter: TokenBucketConfig {
            capacity: 20,
            refill_per_sec: 20,
        },
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            trading: default_trading(),
            market_data: default_market_data(),
            account_data: ClassConfig::default(),
        }
    }
}

impl ResilienceConfig {
    pub fn for_class(&self, class: OperationClass) -> &ClassConfig {
        match class {
            OperationClass::Trading => &self.trading,
            OperationClass::MarketData => &self.market_data,
            OperationClass::AccountData => &self.account_data,
        }
    }
}

/// Shared breakers and limiters keyed by name.
pub struct ResilienceRegistry {
    config: ResilienceConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    limiters: DashMap<String, Arc<TokenBucket>>,
    observer: Option<StateChangeObserver>,
}

impl ResilienceRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            limiters: DashMap::new(),
            observer: None,
        }
    }

    /// Attach an observer to every breaker created from now on.
    pub fn with_observer(mut self, observer: StateChangeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Get the breaker registered under `name`, creating it with `config` if absent.
    ///
    /// `config` is ignored when the breaker already exists.
    pub fn breaker(&self, name: &str, config: &CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut breaker = CircuitBreaker::new(name, config.clone());
                if let Some(observer) = &self.observer {
                    breaker = breaker.with_observer(Arc::clone(observer));
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Get the limiter registered under `name`, creating it with `config` if absent.
    pub fn limiter(&self, name: &str, config: &TokenBucketConfig) -> Arc<TokenBucket> {
        self.limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(name, config)))
            .clone()
    }

    pub fn breaker_for(&self, class: OperationClass) -> Arc<CircuitBreaker> {
        self.breaker(class.as_str(), &self.config.for_class(class).breaker)
    }

    pub fn limiter_for(&self, class: OperationClass) -> Arc<TokenBucket> {
        self.limiter(class.as_str(), &self.config.for_class(class).limiter)
    }

    /// Snapshots of every registered breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> =
            self.breakers.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Reset every breaker to closed and refill every limiter.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        for entry in self.limiters.iter() {
            entry.value().reset();
        }
        info!(
            breakers = self.breakers.len(),
            limiters = self.limiters.len(),
            "Resilience registry reset"
        );
    }
}

impl fmt::Debug for ResilienceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceRegistry")
            .field("breakers", &self.breakers.len())
            .field("limiters", &self.limiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;

    #[test]
    fn test_same_name_returns_same_instance() {
        let registry = ResilienceRegistry::new(ResilienceConfig::default());
        let a = registry.breaker_for(OperationClass::Trading);
        let b = registry.breaker_for(OperationClass::Trading);
        assert!(Arc::ptr_eq(&a, &b));

        let c = registry.breaker_for(OperationClass::MarketData);
        assert!(!Arc::ptr_eq(&a, &c));

        let l1 = registry.limiter_for(OperationClass::AccountData);
        let l2 = registry.limiter("account_data", &TokenBucketConfig::default());
        assert!(Arc::ptr_eq(&l1, &l2));
    }

    #[test]
    fn test_classes_use_their_own_config() {
        let registry = ResilienceRegistry::new(ResilienceConfig::default());
        assert_eq!(registry.limiter_for(OperationClass::Trading).capacity(), 5);
        assert_eq!(registry.limiter_for(OperationClass::MarketData).capacity(), 20);
        assert_eq!(registry.limiter_for(OperationClass::AccountData).capacity(), 10);
    }

    #[test]
    fn test_reset_all_closes_breakers() {
        let registry = ResilienceRegistry::new(ResilienceConfig::default());
        let breaker = registry.breaker_for(OperationClass::Trading);
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let limiter = registry.limiter_for(OperationClass::Trading);
        assert!(limiter.allow_n(5));

        registry.reset_all();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(limiter.available(), 5);
    }

    #[test]
    fn test_snapshots_sorted() {
        let registry = ResilienceRegistry::new(ResilienceConfig::default());
        for class in OperationClass::ALL {
            registry.breaker_for(class);
        }
        let names: Vec<String> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["account_data", "market_data", "trading"]);
    }

    #[test]
    fn test_config_deserializes_partial_toml() {
        let config: ResilienceConfig = toml::from_str(
            r#"
            [trading.breaker]
            failure_threshold = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.trading.breaker.failure_threshold, 7);
        assert_eq!(config.trading.limiter.capacity, 10);
        assert_eq!(config.market_data.limiter.capacity, 20);
    }
}
