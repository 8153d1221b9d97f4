// Presentation layer - HTTP surface over the view registry
pub mod app_state;
pub mod handlers;
