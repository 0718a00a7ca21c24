pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod devices;
pub mod error;
pub mod ingest;
pub mod schema;
pub mod utils;
pub mod web;
