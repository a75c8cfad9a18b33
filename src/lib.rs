pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod ratelimit;
pub mod routes;
pub mod stats;
pub mod store;
