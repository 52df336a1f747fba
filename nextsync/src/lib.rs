pub mod config;
pub mod media;
pub mod progress;
pub mod sync;
