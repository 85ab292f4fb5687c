pub mod billing_gateway;
pub mod durable_storage;
pub mod identity_provider;
