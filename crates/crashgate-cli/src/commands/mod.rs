pub mod config;
pub mod minidumps;
pub mod reports;
