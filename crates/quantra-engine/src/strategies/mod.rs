//! Built-in strategy implementations.

pub mod buy_and_hold;
pub mod ma_crossover;

pub use buy_and_hold::BuyAndHold;
pub use ma_crossover::MovingAverageCrossover;

use crate::strategy::StrategyRegistry;

impl StrategyRegistry {
    /// Builds the registry with the built-in strategies.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("BuyAndHold", Box::new(|_params| Ok(Box::new(BuyAndHold::new()))));
        registry.register(
            "MovingAverageCrossover",
            Box::new(|params| Ok(Box::new(MovingAverageCrossover::from_parameters(params)?))),
        );
        registry
    }
}
