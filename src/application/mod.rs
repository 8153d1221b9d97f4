// Application layer - Polling, reconciliation and session use cases
pub mod data_channel;
pub mod host_bridge;
pub mod layout_policy;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod terminal_service;
pub mod view_model;
pub mod view_registry;
