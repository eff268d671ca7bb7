pub mod account;
pub mod auth;
pub mod email;
pub mod login_guard;
pub mod rate_limit;
pub mod reminder;
pub mod token;
