//! Test doubles for pipeline testing.
//!
//! This module provides:
//! - A scripted measurement source
//! - In-memory and fault-injecting remote stores
//! - Sample payloads for both datasets
//! - A scripted local HTTP responder

mod fixtures;
#[cfg(feature = "http")]
mod http;
mod sources;
mod stores;

pub use fixtures::{churn_csv, hourly_payload, POLLUTANT_METRICS};
#[cfg(feature = "http")]
pub use http::{RecordedRequest, StubHttpServer};
pub use sources::ScriptedSource;
pub use stores::{FlakyStore, InMemoryStore};
