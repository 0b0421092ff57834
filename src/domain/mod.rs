//! Domain layer: session state and rules, free of I/O.

pub mod models;
pub mod profile;
pub mod session;
pub mod settings;
