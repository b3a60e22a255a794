//! Stages that can run before a handler.
//!
//! - [`rate_limit`]: per-route token buckets keyed by client address.
//! - [`auth`]: the gate in front of every non-public endpoint.
//!
//! The order they run in is fixed by [`Pipeline`](crate::Pipeline).

pub mod auth;
pub mod rate_limit;
