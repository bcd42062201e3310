pub mod config;
pub mod i18n;
pub mod platform;
pub mod protocol;
