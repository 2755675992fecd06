//! Core domain types, provider abstractions and offline computations

pub mod analysis;
pub mod builder;
pub mod cache;
pub mod config;
pub mod coverage;
pub mod dataset;
pub mod fx;
pub mod indicator;
pub mod log;
pub mod output;
pub mod stats;
