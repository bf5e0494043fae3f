//! Persistent caches for expensive analysis results

pub mod lock_table;
pub mod pitch_cache;
pub mod separation_cache;

pub use lock_table::BoundedLockTable;
pub use pitch_cache::{AudioFrameCache, PitchCacheKey, PitchCurve};
pub use separation_cache::{sanitize_model_name, SeparationCache};
