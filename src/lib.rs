//! Mail Digest — email ingestion, attachment text extraction, and
//! model-assisted rewriting for downstream review and forwarding.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod monitor;
pub mod processor;
pub mod sender;
pub mod store;
