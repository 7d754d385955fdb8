// src/lib.rs

//! Demand scaffolding library

#[cfg(feature = "aws")]
pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod handler;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
