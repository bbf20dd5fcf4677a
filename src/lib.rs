//! devmon - device monitoring service
//!
//! Reports this device's identity and service health (`DeviceInfo`) and the
//! reachability of its peers (`PingResult`) over a small JSON API and HTML
//! dashboard.

pub mod client;
pub mod config;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod scheduler;
pub mod web;
