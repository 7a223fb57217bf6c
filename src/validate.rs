//! Stateless structural checks evaluated before any lifecycle mutation
use crate::error::{IllegalTransition, ValidationError};
use crate::product::Product;
use crate::swap::SwapStatus;
use crate::user::User;

/// Structural checks for opening a swap request. Pure; the service layer
/// re-checks availability inside the acceptance transaction, this guards
/// the obvious cases up front.
pub fn can_create_swap_request(
    requester: &User,
    target: &Product,
    offered: Option<&Product>,
) -> Result<(), ValidationError> {
    if requester.user_id == target.owner {
        return Err(ValidationError::SelfSwap);
    }
    if !target.offerable() {
        return Err(ValidationError::ProductUnavailable(
            target.product_id.clone(),
        ));
    }
    if let Some(offered) = offered {
        if offered.owner != requester.user_id {
            return Err(ValidationError::NotOwner(offered.product_id.clone()));
        }
        if !offered.offerable() {
            return Err(ValidationError::ProductUnavailable(
                offered.product_id.clone(),
            ));
        }
    }

    Ok(())
}

/// The legal graph for swap requests:
/// Pending -> {Accepted, Rejected, Cancelled}, Accepted -> {Completed, Cancelled}.
pub fn can_transition_request(from: SwapStatus, to: SwapStatus) -> Result<(), IllegalTransition> {
    use SwapStatus::*;

    match (from, to) {
        (Pending, Accepted)
        | (Pending, Rejected)
        | (Pending, Cancelled)
        | (Accepted, Completed)
        | (Accepted, Cancelled) => Ok(()),
        _ => Err(IllegalTransition { from, to }),
    }
}

/// The legal graph for swap transactions: created Pending, then
/// Pending -> {Completed, Cancelled}.
pub fn can_transition_swap(from: SwapStatus, to: SwapStatus) -> Result<(), IllegalTransition> {
    use SwapStatus::*;

    match (from, to) {
        (Pending, Completed) | (Pending, Cancelled) => Ok(()),
        _ => Err(IllegalTransition { from, to }),
    }
}
