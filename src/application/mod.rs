//! Application services: resolution, lookup and repository contracts.

pub mod error;
pub mod price_service;
pub mod pricing;
pub mod repos;
