pub mod acquire;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod grid;
pub mod models;
pub mod profiles;
