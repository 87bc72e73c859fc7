// Crew portal scraping service: deduplicated, cached schedule retrieval for many pilots.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod portal;
pub mod server;
pub mod telemetry;
pub mod vault;
