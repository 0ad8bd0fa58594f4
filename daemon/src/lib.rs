//! HTTP control plane for the LED matrix: routes requests to the display
//! configuration, the renderer supervisor and the media catalog.

pub mod config;
pub mod display;
pub mod error;
pub mod media;
pub mod server;
pub mod settings;
