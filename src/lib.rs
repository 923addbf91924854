pub mod benchmark;
pub mod config;
pub mod datasets;
pub mod error;
pub mod evaluate;
pub mod models;
pub mod utils;
