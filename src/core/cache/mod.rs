//! Cache module for synthesized prompt audio.

pub mod store;

pub use store::{CacheMetrics, PromptCache, PromptCacheConfig, prompt_key};
