// Client engine for the ballot tracker: remote API seams, the view-state
// reducer, optimistic mutation and live-sync machinery, and the orchestrating
// event loop.

pub mod admin;
pub mod api;
pub mod app;
pub mod protocol;
pub mod render;
pub mod state;
pub mod sync;
