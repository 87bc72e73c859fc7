// HTTP surface: request dispatch, CORS and per-client rate limiting.

pub mod handler;
pub mod rate_limit;
