pub mod cli;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod feed;
pub mod gateway;
pub mod http_cache;
pub mod http_client;
pub mod json_value;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod scanner;
pub mod stat_normalizer;
