//! Local storage

pub mod settings;
pub mod state_dirs;
