pub mod app;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod query;
pub mod server;
pub mod stats;
pub mod store;
pub mod ui_model;
