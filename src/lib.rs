//! DeSciHub backend library.
//!
//! A web backend for a decentralized science platform: wallet-identified
//! researchers, projects with kanban boards and milestones, datasets with
//! permissioned access and simulated zero-knowledge proofs, publications,
//! peer reviews, simulated NFT minting with a marketplace, likes with
//! cached counters, activity logs and influence scores.
//!
//! The HTTP surface lives in [`api`], persistence in [`database`], and
//! the simulated chain and proof services in [`chain`] and [`zk`].

pub mod activity;
pub mod api;
pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod influence;
pub mod storage;
pub mod zk;

pub use api::AppState;
pub use config::AppConfig;
pub use database::{DatabaseConfig, DatabaseManager};
pub use error::{ApiError, ApiResult};
