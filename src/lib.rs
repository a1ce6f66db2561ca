//! Crop disease classification behind a small HTTP API.
//!
//! The server binary loads [`config::AppConfig`] and a [`model::Classifier`]
//! once, wraps them in a [`service::Predictor`] and serves it through
//! [`server::router`]. The [`client`] module is the consumer side used by
//! `plantmd-client`.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod service;

pub use error::{PlantError, Result};
