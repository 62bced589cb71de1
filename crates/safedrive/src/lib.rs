//! `safedrive` - A resilient client for vehicle-safety telemetry
//!
//! This library talks to the SafeDrive telemetry API: it fetches sensor
//! readings and accident events with timeouts, retries and cancellation,
//! polls for live data, keeps a local `SQLite` history, flags dangerous
//! readings, and bundles everything into evidence packages.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod client;
pub mod config;
pub mod demo;
pub mod detection;
pub mod error;
pub mod logging;
pub mod poller;
pub mod reading;
pub mod report;
pub mod storage;

pub use client::{ApiClient, CancelToken, DashboardSnapshot, Endpoint, RetryPolicy};
pub use config::Config;
pub use detection::{assess, AccidentDetector, Assessment, DangerLevel, Hazard, Thresholds};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use poller::{PollUpdate, Poller, PollerConfig, PollerManager};
pub use reading::{AccidentEvent, ApiStats, DataSource, GpsFix, SensorReading, Severity};
pub use report::{EvidencePackage, Summary};
pub use storage::{Storage, StorageStats};
