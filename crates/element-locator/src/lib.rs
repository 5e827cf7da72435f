//! Element resolution for the low-code platform UI.
//!
//! Six structural strategies run in a fixed, configurable order; only
//! when every strategy is exhausted does the resolver fall back to the
//! vision provider, and a proposal is used only after it re-resolves
//! against the live DOM at or above the confidence floor.

pub mod error;
pub mod resolver;
pub mod strategy;
pub mod types;

pub use error::LocatorError;
pub use resolver::{DefaultElementResolver, ElementResolver};
pub use strategy::{selectors_for, Strategy};
pub use types::{LocatorConfig, RequiredState, Resolution, StrategyKind};
