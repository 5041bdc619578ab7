pub mod audit;
pub mod auth;
pub mod health;
pub mod helpers;
pub mod mfa;
pub mod password;
pub mod roles;
pub mod sessions;
pub mod users;
