pub mod audio_buffer;
pub mod config;
pub mod error;
pub mod state;
pub mod stream_settings;
