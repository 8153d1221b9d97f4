// Infrastructure layer - External dependencies and adapters
pub mod chunked_stream;
pub mod config;
pub mod http_channel;
pub mod http_response;
pub mod payload;
