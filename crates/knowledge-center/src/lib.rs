//! Versioned solution storage, the reward engine and the knowledge
//! index.
//!
//! Solutions accumulate immutable versions; rewards drive status and
//! score transitions; only accepted solutions ever reach the knowledge
//! index, which serves similarity-ranked seeds back to the agent.

pub mod entries;
pub mod persist;
pub mod reward;
pub mod store;

pub use entries::{signature_of, KnowledgeStore, SimilarityProvider, TokenSimilarity};
pub use persist::{load_snapshot, save_snapshot, Snapshot};
pub use reward::{RewardConfig, RewardEngine, RewardError, RewardOutcome};
pub use store::SolutionStore;
