//! Subcommand handlers

pub mod collections;
pub mod download;
pub mod info;
pub mod missing;
pub mod osdb;
