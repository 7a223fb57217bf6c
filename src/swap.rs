//! Swap request and swap transaction records
use crate::ids::{ProductId, RequestId, SwapId, TimeStamp, UserId};
use chrono::Utc;

/// One status enum shared by requests and transactions. Requests walk the
/// full graph; transactions only ever see Pending, Completed and Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum SwapStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Completed,
    #[n(4)]
    Cancelled,
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapStatus::Rejected | SwapStatus::Completed | SwapStatus::Cancelled
        )
    }

    /// An active swap still holds its products; see the one-hold-per-product
    /// invariant enforced at acceptance time.
    pub fn is_active(self) -> bool {
        matches!(self, SwapStatus::Pending | SwapStatus::Accepted)
    }
}

/// A proposal from a requester to acquire a target product, optionally
/// offering one of their own in exchange.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct SwapRequest {
    #[n(0)]
    pub request_id: RequestId,
    #[n(1)]
    pub requester: UserId,
    #[n(2)]
    pub target_product: ProductId,
    /// None models a one-way give-away ask.
    #[n(3)]
    pub offered_product: Option<ProductId>,
    #[n(4)]
    pub status: SwapStatus,
    #[n(5)]
    pub message: Option<String>,
    /// Set once the request is accepted; 1:1 with the paired transaction.
    #[n(6)]
    pub swap: Option<SwapId>,
    #[n(7)]
    pub version: u64,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

impl SwapRequest {
    pub fn open(
        requester: UserId,
        target_product: ProductId,
        offered_product: Option<ProductId>,
        message: Option<String>,
        at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            requester,
            target_product,
            offered_product,
            status: SwapStatus::Pending,
            message,
            swap: None,
            version: 0,
            created_at: at.clone(),
            updated_at: at,
        }
    }
}

/// The realized exchange once a request is accepted. The two participant
/// slots are asymmetric in storage but semantically unordered; go through
/// [`SwapTransaction::participants`] instead of reading the slots directly.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct SwapTransaction {
    #[n(0)]
    pub swap_id: SwapId,
    #[n(1)]
    pub request: RequestId,
    /// The party giving up the target product.
    #[n(2)]
    pub owner: UserId,
    #[n(3)]
    pub owner_product: ProductId,
    #[n(4)]
    pub requester: UserId,
    /// None for one-way give-away swaps.
    #[n(5)]
    pub offered_product: Option<ProductId>,
    #[n(6)]
    pub status: SwapStatus,
    #[n(7)]
    pub completed_at: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub version: u64,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

impl SwapTransaction {
    /// Pair a freshly accepted request with its transaction.
    pub fn open(
        request: &SwapRequest,
        owner: UserId,
        swap_id: SwapId,
        at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            swap_id,
            request: request.request_id.clone(),
            owner,
            owner_product: request.target_product.clone(),
            requester: request.requester.clone(),
            offered_product: request.offered_product.clone(),
            status: SwapStatus::Pending,
            completed_at: None,
            version: 0,
            created_at: at.clone(),
            updated_at: at,
        }
    }

    /// Unordered view over the two participant slots.
    pub fn participants(&self) -> Participants<'_> {
        Participants { swap: self }
    }

    /// Every product referenced by this swap (one or two).
    pub fn products(&self) -> impl Iterator<Item = &ProductId> {
        std::iter::once(&self.owner_product).chain(self.offered_product.as_ref())
    }

    pub fn involves_product(&self, product: &ProductId) -> bool {
        self.products().any(|p| p == product)
    }
}

/// Collapses the two asymmetric participant slots into one unordered pair.
#[derive(Debug, Clone, Copy)]
pub struct Participants<'a> {
    swap: &'a SwapTransaction,
}

impl<'a> Participants<'a> {
    pub fn contains(&self, user: &UserId) -> bool {
        *user == self.swap.owner || *user == self.swap.requester
    }

    /// The counterparty of `user`, if `user` participates at all.
    pub fn other(&self, user: &UserId) -> Option<&'a UserId> {
        if *user == self.swap.owner {
            Some(&self.swap.requester)
        } else if *user == self.swap.requester {
            Some(&self.swap.owner)
        } else {
            None
        }
    }

    /// Unordered pair equality: does {a, b} match the two participants?
    pub fn links(&self, a: &UserId, b: &UserId) -> bool {
        self.other(a).is_some_and(|counterparty| counterparty == b)
    }

    /// The product brought in by `user`, if any.
    pub fn product_of(&self, user: &UserId) -> Option<&'a ProductId> {
        if *user == self.swap.owner {
            Some(&self.swap.owner_product)
        } else if *user == self.swap.requester {
            self.swap.offered_product.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reciprocal_swap() -> SwapTransaction {
        let request = SwapRequest::open(
            UserId::new(),
            ProductId::new(),
            Some(ProductId::new()),
            None,
            TimeStamp::new(),
        );
        SwapTransaction::open(&request, UserId::new(), SwapId::new(), TimeStamp::new())
    }

    #[test]
    fn participants_are_unordered() {
        let swap = reciprocal_swap();
        let (a, b) = (swap.owner.clone(), swap.requester.clone());

        assert!(swap.participants().links(&a, &b));
        assert!(swap.participants().links(&b, &a));
        assert!(!swap.participants().links(&a, &UserId::new()));
        assert!(!swap.participants().links(&a, &a));
    }

    #[test]
    fn other_resolves_the_counterparty() {
        let swap = reciprocal_swap();

        assert_eq!(swap.participants().other(&swap.owner), Some(&swap.requester));
        assert_eq!(swap.participants().other(&swap.requester), Some(&swap.owner));
        assert_eq!(swap.participants().other(&UserId::new()), None);
    }

    #[test]
    fn products_cover_both_sides() {
        let swap = reciprocal_swap();
        assert_eq!(swap.products().count(), 2);
        assert!(swap.involves_product(&swap.owner_product));
    }

    #[test]
    fn give_away_swap_has_one_product() {
        let request = SwapRequest::open(
            UserId::new(),
            ProductId::new(),
            None,
            None,
            TimeStamp::new(),
        );
        let swap =
            SwapTransaction::open(&request, UserId::new(), SwapId::new(), TimeStamp::new());

        assert_eq!(swap.products().count(), 1);
        assert_eq!(swap.participants().product_of(&swap.requester), None);
    }
}
