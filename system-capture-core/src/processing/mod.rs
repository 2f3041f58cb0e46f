pub mod format_log;
pub mod sample_converter;
