pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod expenses;
pub mod response;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
