//! Domain models

pub mod artifact;
pub mod repo;
pub mod request;
pub mod result;
