//! Reviews and the eligibility gate in front of them
use crate::error::{ConflictError, SwapError, ValidationError};
use crate::ids::{ProductId, TimeStamp, UserId};
use crate::store::SwapStore;
use crate::swap::SwapStatus;
use chrono::Utc;

/// Bounded 1..=5 star rating. Construct through [`Rating::new`]; out-of-range
/// values never make it into a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, minicbor::Encode, minicbor::Decode,
)]
#[cbor(transparent)]
pub struct Rating(#[n(0)] u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::RatingOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Feedback from one participant of a completed swap about the other,
/// scoped to a product. Keyed in storage by its uniqueness triple.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Review {
    #[n(0)]
    pub product: ProductId,
    #[n(1)]
    pub reviewer: UserId,
    #[n(2)]
    pub reviewee: UserId,
    #[n(3)]
    pub rating: Rating,
    #[n(4)]
    pub comment: Option<String>,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

/// May (reviewer, reviewee, product) produce a review right now?
///
/// Eligibility requires a completed swap linking the two users through the
/// product. One review per party per completed swap; a second attempt for
/// the same triple is a conflict. The final word on duplicates is the
/// conditional insert in the service layer, this check just answers early.
pub fn can_review(
    store: &SwapStore,
    reviewer: &UserId,
    reviewee: &UserId,
    product: &ProductId,
) -> Result<(), SwapError> {
    let eligible = store.swaps_for_product(product)?.iter().any(|swap| {
        swap.status == SwapStatus::Completed && swap.participants().links(reviewer, reviewee)
    });

    if !eligible {
        return Err(SwapError::NotEligible {
            reviewer: reviewer.clone(),
            reviewee: reviewee.clone(),
            product: product.clone(),
        });
    }

    if store.review(reviewer, reviewee, product)?.is_some() {
        return Err(ConflictError::DuplicateReview {
            reviewer: reviewer.clone(),
            reviewee: reviewee.clone(),
            product: product.clone(),
        }
        .into());
    }

    Ok(())
}
