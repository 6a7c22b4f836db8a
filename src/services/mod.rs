pub mod access;
pub mod auth;
pub mod cache;
pub mod captcha;
pub mod discounts;
pub mod eventbrite;
pub mod init;
pub mod membership;
pub mod reconcile;
pub mod redemption;
