// Public API for integration tests and potential library usage

pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod scoring;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
