//! Request handlers

pub mod analysis;
pub mod health;
pub mod history;
pub mod papers;
pub mod search;
pub mod settings;
pub mod trends;
