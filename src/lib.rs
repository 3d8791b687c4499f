//! Taxishift - shift and ride lifecycle tracking for taxi drivers.
//!
//! # Overview
//!
//! A driver moves through a shift with four signals: `start`, `pause`,
//! `continue` and `stop`. Every signal is checked against the driver's last
//! signal and against any ride in progress. Completed breaks are recorded as
//! pauses, and stopping a shift freezes its statistics (work time, breaks,
//! earnings). Inside an unpaused shift the driver runs rides one at a time.
//! Fares are computed from elapsed time and great-circle distance.
//!
//! State lives in SQLite, not in process memory. The one-open-shift-per-driver
//! and one-open-ride-per-shift rules are unique indexes, so concurrent
//! requests cannot both win.
//!
//! # Modules
//!
//! - [`model`]: Shifts, signals, pauses, rides and request/response types
//! - [`signal`]: The signal transition table
//! - [`calculator`]: Break, work-time, distance and fare math
//! - [`storage`]: SQLite storage layer
//! - [`shift`], [`pause`], [`ride`]: The lifecycles
//! - [`expiry`]: Cleanup of abandoned shifts and rides
//! - [`scoring`]: External trip scoring client
//! - [`app`]: The operations, wired together
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod app;
pub mod calculator;
pub mod config;
pub mod error;
pub mod expiry;
pub mod model;
pub mod pause;
pub mod ride;
pub mod scoring;
pub mod shift;
pub mod signal;
pub mod storage;
