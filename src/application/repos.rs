//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Promotion, PromotionId, Variation, VariationId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
    #[error("resource not found")]
    NotFound,
    #[error("invalid row: {message}")]
    InvalidRow { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Storage unavailability; callers may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Persistence(_) | RepoError::Timeout)
    }
}

/// Read side of the catalog used by price resolution.
///
/// Implementations perform plain reads: no caching and no filtering by
/// activity or time window.
#[async_trait]
pub trait PromotionsRepo: Send + Sync {
    async fn find_variation(&self, id: VariationId) -> Result<Option<Variation>, RepoError>;

    /// Every promotion targeting this variation, its product, or the whole
    /// catalog, regardless of status.
    async fn find_candidate_promotions(
        &self,
        variation_id: VariationId,
    ) -> Result<Vec<Promotion>, RepoError>;

    async fn find_promotion(&self, id: PromotionId) -> Result<Option<Promotion>, RepoError>;
}
