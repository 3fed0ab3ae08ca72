// Shared domain types and local-origin plumbing for the ballot tracker:
// snapshot/record models, change-detection signatures, durable key-value
// storage, persisted preferences and pick cache, the cross-tab signal bus,
// and configuration loading.

pub mod bus;
pub mod config;
pub mod local;
pub mod model;
pub mod signature;
pub mod storage;
pub mod view;
