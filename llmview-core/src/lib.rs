pub mod assembly;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod http_client;
pub mod inspect;
pub mod model;
pub mod providers;
pub mod source;
pub mod sse;
pub mod telemetry;
