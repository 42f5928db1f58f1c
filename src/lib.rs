//! Promotional price resolution for a storefront catalog, served through a
//! two-tier cache that is invalidated on catalog mutations.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
