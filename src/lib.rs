pub mod config;
pub mod pki;
pub mod setup;
pub mod store;
pub mod telemetry;
