pub mod audio_channel;
pub mod dispatcher;
pub mod status_channel;
