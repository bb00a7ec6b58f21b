pub mod admin;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod lookup;
pub mod reports;
pub mod shared;
pub mod tickets;
