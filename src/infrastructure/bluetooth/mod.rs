//! Bluetooth Module
//!
//! GATT session plumbing for OpenBCI Ganglion and Cyton boards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     SessionService                       │
//! │  (event loop: transport events + user commands)          │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │
//! │           │  │            │  │          │
//! │ - BLE     │  │ - btleplug │  │ - UUIDs  │
//! │  discovery│  │   worker   │  │ - Names  │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUID tables, display names and stream commands
//! - [`transport`] - The `GattTransport` seam and its in-memory recorder
//! - [`service`] - Session event loop
//! - `scanner` - BLE device discovery (feature `btleplug`)
//! - `connection` - btleplug transport (feature `btleplug`)

#[cfg(feature = "btleplug")]
pub mod connection;
pub mod protocol;
#[cfg(feature = "btleplug")]
pub mod scanner;
pub mod service;
pub mod transport;

pub use service::{SessionCommand, SessionService};
