//! Session controller for OpenBCI Ganglion and Cyton boards over BLE GATT.
//!
//! The [`domain`] layer decides what to do with discovered services,
//! characteristic clicks and incoming data. The [`infrastructure`] layer
//! runs it against a real (or recorded) GATT transport.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{ConnectionState, UiEvent};
pub use domain::profile::DeviceProfile;
pub use domain::session::{GattSessionController, SessionConfig, SessionInfo};
pub use error::{SessionError, TransportError};
