pub mod analytics;
pub mod config;
pub mod document;
pub mod error;
pub mod http;
pub mod transport;
pub mod utils;
