//! wdeploy Library
//!
//! Core modules for deploying Cloudflare Workers from GitHub repositories.

pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
