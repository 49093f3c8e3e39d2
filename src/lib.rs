pub mod api;
pub mod clinic;
pub mod config;
pub mod entities;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod migrator;
pub mod mirror;
pub mod telemetry;
pub mod views;

pub use sea_orm;
