//! Strategy trait and name-keyed registry.

use crate::error::{EngineError, EngineResult};
use crate::portfolio::Portfolio;
use quantra_core::MarketPoint;
use std::collections::HashMap;

/// A trading strategy driven tick-by-tick by the backtest kernel.
///
/// Strategies own whatever rolling state they need (e.g. moving-average
/// windows); the kernel only feeds them points and the run's portfolio.
pub trait Strategy: Send + std::fmt::Debug {
    /// The registered strategy name.
    fn name(&self) -> &str;

    /// Called once per market point, in chronological order.
    fn on_tick(&mut self, point: &MarketPoint, portfolio: &mut Portfolio);

    /// Called after the final tick; typically liquidates the position.
    fn on_finish(&mut self, _portfolio: &mut Portfolio) {}
}

/// Factory closure building a strategy from its opaque parameter blob.
pub type StrategyFactory =
    Box<dyn Fn(&serde_json::Value) -> EngineResult<Box<dyn Strategy>> + Send + Sync>;

/// Registry mapping strategy names to factories.
///
/// The orchestration layers never parse strategy parameters; the blob is
/// handed to the factory untouched. Unknown names are an error, never a
/// silent substitution.
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under a name, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: StrategyFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Returns true when a factory is registered under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates the named strategy from the parameter blob.
    pub fn create(
        &self,
        name: &str,
        parameters: &serde_json::Value,
    ) -> EngineResult<Box<dyn Strategy>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;
        factory(parameters)
    }

    /// Lists the registered strategy names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_strategy_is_an_error() {
        let registry = StrategyRegistry::new();
        let err = registry.create("Nope", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy(_)));
    }

    #[test]
    fn test_standard_registry_contents() {
        let registry = StrategyRegistry::standard();
        assert!(registry.contains("BuyAndHold"));
        assert!(registry.contains("MovingAverageCrossover"));
        assert!(!registry.contains("buyandhold"));
    }
}
