pub mod app;
pub mod collector;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod formats;
pub mod http;
pub mod output;
pub mod progress;
pub mod slug;
pub mod store;
