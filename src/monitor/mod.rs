//! Producers for the wire records.
//!
//! `device` gathers this host's `DeviceInfo`, `services` checks local
//! service health into `Status` entries, and `sweep` pings peer devices into
//! a `PingResult`.

mod device;
mod services;
mod sweep;

pub use device::*;
pub use services::*;
pub use sweep::*;
