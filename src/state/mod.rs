// src/state/mod.rs
mod app_state;

pub use app_state::AppState;
