pub mod catalog;
pub mod channel;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod gateway;
pub mod reaction;
pub mod rng;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod types;
pub mod view;
pub mod worker;
