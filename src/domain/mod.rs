// Domain layer - Instrument data, view state and the serial session
pub mod geometry;
pub mod host;
pub mod layout;
pub mod sample;
pub mod session;
pub mod timeseries;
pub mod view_state;
