#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::large_enum_variant,
    clippy::missing_errors_doc
)]
#![forbid(unsafe_code)]

mod config;
pub use config::{DynAppConfig, CONFIG};

pub mod api;
pub mod catalog;
pub mod implementations;
pub mod service;

pub use axum;
pub use sqlx;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
