pub mod audit;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod generator;
pub mod model;
pub mod optimizer;
pub mod pipeline;
pub mod prescreen;
pub mod providers;
pub mod storage;
pub mod validator;

pub use pipeline::{next_request_id, PipelineSettings, QueryPipeline};
