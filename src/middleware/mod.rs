pub mod auth;
pub mod csrf;
pub mod security;
pub mod user_rate_limit;
