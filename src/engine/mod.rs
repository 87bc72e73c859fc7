// Engine orchestration: schedule cache, in-flight deduplication and service statistics.

pub mod cache;
pub mod session;
pub mod stats;
