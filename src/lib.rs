pub mod args;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod frame;
pub mod help;
pub mod interrupt;
pub mod materialize;
pub mod modes;
pub mod reply;
pub mod server_info;
pub mod ssh;

pub use error::{Error, Result};
