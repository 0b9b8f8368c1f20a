//! Universe screening.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────┐    ┌───────────────────┐
//! │ ScreenFilter │───▶│  ScreeningCache   │───▶│  ScreenerEngine   │
//! │ + Universe   │    │  (single-flight,  │    │  (bounded pool,   │
//! │ + trading    │    │   per trading     │    │   per-symbol      │
//! │   date       │    │   date, snapshot) │    │   timeout)        │
//! └──────────────┘    └───────────────────┘    └─────────┬─────────┘
//!                                                        │
//!                     indicators → patterns → RS → score ◀┘
//! ```
//!
//! The [`RecommendationScheduler`] warms the cache with the all-universe scan
//! after each close and records a dated top-N history.

pub mod cache;
pub mod engine;
pub mod filter;
pub mod scheduler;

pub use cache::{CacheStats, ScreeningCache};
pub use engine::{sort_entries, ScreenEntry, ScreenResult, ScreenerEngine, SkippedSymbol};
pub use filter::{CacheKey, ScreenFilter};
pub use scheduler::{
    RecommendationHistory, RecommendationScheduler, RecommendationSnapshot, RefreshJob,
    SchedulerStatus,
};
