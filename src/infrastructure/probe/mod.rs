//! Connectivity probe adapters

pub mod http;

pub use http::NetworkProbe;
