use crate::ids::{ProductId, UserId};
use crate::swap::SwapStatus;

/// Client-input failures. Always recoverable by the caller correcting input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("requester already owns the target product")]
    SelfSwap,
    #[error("product {0} is not available for swapping")]
    ProductUnavailable(ProductId),
    #[error("product {0} is not owned by the requester")]
    NotOwner(ProductId),
    #[error("rating {0} is outside the accepted 1..=5 range")]
    RatingOutOfRange(u8),
    #[error("required field '{0}' is missing or blank")]
    MissingField(&'static str),
}

/// State changed under the caller's feet. Surfaced as "refresh and retry".
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("{0} was resolved by a concurrent operation")]
    AlreadyResolved(String),
    #[error("{reviewer} already reviewed {reviewee} for product {product}")]
    DuplicateReview {
        reviewer: UserId,
        reviewee: UserId,
        product: ProductId,
    },
    #[error("email {0} is already registered")]
    EmailTaken(String),
}

/// A transition outside the legal lifecycle graph. Caller bug, never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
    pub from: SwapStatus,
    pub to: SwapStatus,
}

#[derive(thiserror::Error, Debug)]
pub enum SwapError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Transition(#[from] IllegalTransition),
    #[error("{kind} {id} was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no completed swap links {reviewer} and {reviewee} through product {product}")]
    NotEligible {
        reviewer: UserId,
        reviewee: UserId,
        product: ProductId,
    },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("record codec failure under key {key}: {detail}")]
    Codec { key: String, detail: String },
}

impl SwapError {
    pub(crate) fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
