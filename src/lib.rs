pub mod cli;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod sheet;
pub mod storage;
