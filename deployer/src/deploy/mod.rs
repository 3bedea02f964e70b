//! Deployment module

pub mod api;
pub mod ci;
pub mod cli;
pub mod descriptor;
pub mod fsm;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod source;
pub mod strategy;
pub mod success;
pub mod workspace;
