//! Integration test harness.

mod handshake;
mod helpers;
mod queries;
mod tombstones;
