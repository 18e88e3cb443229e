//! Outbound network helpers

pub mod ip_lookup;
