pub mod engine;
pub mod vendor_client;
