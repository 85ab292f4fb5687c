pub mod auth_recovery;
pub mod cancellation;
pub mod checkout;
pub mod polling;
pub mod session_ids;
pub mod subscription_store;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_support;
