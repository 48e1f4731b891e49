pub mod config;
pub mod filter;
pub mod interface;
pub mod record;
pub mod stats;
