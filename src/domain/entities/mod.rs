pub mod auth_snapshots;
pub mod checkout_sessions;
