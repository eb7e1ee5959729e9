//! Proxy lifecycle.
//!
//! A trial walks one proxy version through [`TrialPhase`]s: build, start,
//! health check, capture, traffic, extraction and a guaranteed stop.
//! [`SuiteRunner`] sequences trials and persists each result immediately.

pub mod controller;
pub mod health;
pub mod phase;
pub mod suite;
pub mod traffic;

pub use controller::{ProxyController, TrialSettings};
pub use health::{check_health, wait_healthy};
pub use phase::TrialPhase;
pub use suite::{ProxyVersions, SuiteRunner, SuiteSummary};
pub use traffic::{ProxyTrafficDriver, RequestOutcome, TrafficDriver};
