pub mod client;
pub mod commands;
pub mod config;
pub mod logger;
pub mod script;
