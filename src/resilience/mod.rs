//! # Resilience Module
//!
//! Retry-with-backoff for upstream calls that answer with rate limiting.
//! Retrying is a per-job policy: the baseline is [`RetryPolicy::none`], where a
//! rate-limited item is logged and skipped like any other item failure.

pub mod retry;

pub use retry::RetryPolicy;
