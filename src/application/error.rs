use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::price_service::PricingError, domain::error::DomainError, infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("cache invalidation incomplete: {0}")]
    InvalidationIncomplete(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn invalidation_incomplete(message: impl Into<String>) -> Self {
        Self::InvalidationIncomplete(message.into())
    }

    /// The error followed by each of its sources, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = StdError::source(self);
        while let Some(inner) = current {
            let message = inner.to_string();
            if messages.last() != Some(&message) {
                messages.push(message);
            }
            current = inner.source();
        }
        messages
    }
}
