//! HTTP API models for the glidergun deployment service

pub mod models;

pub use models::*;
