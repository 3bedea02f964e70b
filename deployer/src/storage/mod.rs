//! Local storage: settings, directory layout and chat sessions

pub mod layout;
pub mod session;
pub mod settings;
