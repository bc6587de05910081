pub mod config;
pub mod domain;
pub mod effects;
pub mod messaging;
pub mod metrics;
pub mod service;
pub mod store;
pub mod utils;

pub use config::{AppConfig, StoreBackend};
pub use service::{OrderService, ServiceSettings};
