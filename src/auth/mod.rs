pub mod action_token;
pub mod auth;
pub mod jwt;
