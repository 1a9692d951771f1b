//! Cisco NSO RESTCONF access.
//!
//! [`NsoClient`] owns the HTTP plumbing (base URL, basic auth, timeouts) and
//! [`Devices`] maps the handful of device-tree reads the MCP tools expose.

pub mod client;
pub mod devices;
pub mod error;

pub use client::NsoClient;
pub use devices::{DevicePlatform, DeviceSummary, Devices};
pub use error::NsoError;
