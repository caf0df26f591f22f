pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod github;
pub mod refresh;
pub mod snapshot;
pub mod telemetry;

#[cfg(test)]
mod test_support;
