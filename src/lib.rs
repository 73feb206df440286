pub mod aggregate;
pub mod app;
pub mod cli;
pub mod config;
pub mod export;
pub mod logging;
pub mod state;
pub mod stix;
pub mod upload;
pub mod upstream;
pub mod utils;
pub mod web;
pub mod window;
