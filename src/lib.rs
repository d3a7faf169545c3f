pub mod config;
pub mod publication;
pub mod search;
