//! GliderGun Library
//!
//! Deployment lifecycle engine for infrastructure templates packaged as
//! container images.

pub mod app;
pub mod deploy;
pub mod docker;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod network;
pub mod secrets;
pub mod server;
pub mod storage;
pub mod utils;
