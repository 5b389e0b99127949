pub mod aggregator;
pub mod config;
pub mod error;
pub mod generator;
pub mod processor;
pub mod queue;
pub mod storage;
pub mod task;
pub mod trigger;
pub mod types;
pub mod worker;
