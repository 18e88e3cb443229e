//! Deployment lifecycle

pub mod engine;
pub mod labels;
pub mod registry;
pub mod state;
