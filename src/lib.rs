pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod flythrough;
pub mod magnetopause;
pub mod output;
pub mod publication;
pub mod registry;
pub mod store;
pub mod timelist;
