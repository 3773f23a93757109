pub mod abi;
pub mod argument;
pub mod config;
pub mod event;
pub mod executor;
pub mod fetcher;
pub mod invokation;
pub mod network;
pub mod registry;
pub mod value;
pub mod world;
