pub mod checkout;
pub mod enums;
pub mod subscriptions;
pub mod verification;
