//! Library crate for load-probe-rs exposing reusable modules.
pub mod attack;
pub mod config;
pub mod context;
pub mod doctor;
pub mod error;
pub mod http;
pub mod hybrid;
pub mod load;
pub mod prober;
pub mod registry;
pub mod report;
pub mod runner;
pub mod server;
pub mod tools;
pub mod types;
