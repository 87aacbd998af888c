#![forbid(unsafe_code)]

pub mod classification;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod model;
pub mod openai;
pub mod pipeline;
pub mod processor;
pub mod prompt;
pub mod registry;
pub mod response;
pub mod scenario;
pub mod schedule;
pub mod store;
pub mod work;
