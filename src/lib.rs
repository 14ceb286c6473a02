pub mod api;
pub mod busy;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod favorites;
pub mod feed;
pub mod lifecycle;
pub mod messages;
pub mod orders;
pub mod session;
pub mod utils;
