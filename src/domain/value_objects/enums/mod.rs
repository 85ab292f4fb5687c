pub mod api_statuses;
pub mod subscription_plans;
pub mod subscription_statuses;
