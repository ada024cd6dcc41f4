pub mod config;
pub mod controls;
pub mod display;
pub mod error;
pub mod gesture;
pub mod mapping;
pub mod metrics;
pub mod model_download;
pub mod orchestrator;
pub mod pipeline;
pub mod synth;
pub mod types;
