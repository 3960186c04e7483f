pub mod btle;
pub mod classify;
pub mod connection;
pub mod constants;
pub mod listeners;
pub mod parse;
pub mod platform;
pub mod types;

#[cfg(test)]
pub mod mock;
