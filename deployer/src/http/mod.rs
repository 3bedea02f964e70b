//! HTTP clients for remote platforms

pub mod cloudflare;
