pub mod config;
pub mod entities;
pub mod error;
pub mod http;
pub mod query;
pub mod storage;
pub mod store;
