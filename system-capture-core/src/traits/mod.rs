pub mod capture_backend;
pub mod capture_delegate;
pub mod sinks;
