//! Service layer API for the swap lifecycle
//!
//! The one component allowed to move SwapRequest, SwapTransaction and
//! Product availability together. Every operation runs its reads, its
//! commit-time status checks and its writes inside a single sled
//! serializable transaction, so concurrent callers either serialize or
//! abort with a conflict error; no partial state is ever observable.
use crate::error::{ConflictError, SwapError, ValidationError};
use crate::events::{EventEmitter, EventSink, LifecycleEvent};
use crate::ids::{ProductId, RequestId, SwapId, TimeStamp, UserId};
use crate::product::{Product, ProductDraft};
use crate::review::{Rating, Review, can_review};
use crate::store::{self, SwapStore};
use crate::swap::{SwapRequest, SwapStatus, SwapTransaction};
use crate::user::{User, UserDraft};
use crate::validate;
use chrono::Utc;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDecision {
    Accept,
    Reject,
}

/// What responding to a request produced: acceptance pairs the request
/// with a fresh transaction, rejection only moves the request.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Accepted(SwapTransaction),
    Rejected(SwapRequest),
}

/// Either half of a request/transaction pair; cancellation accepts both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRef {
    Request(RequestId),
    Swap(SwapId),
}

impl From<RequestId> for SwapRef {
    fn from(id: RequestId) -> Self {
        SwapRef::Request(id)
    }
}

impl From<SwapId> for SwapRef {
    fn from(id: SwapId) -> Self {
        SwapRef::Swap(id)
    }
}

fn abort<T>(err: impl Into<SwapError>) -> ConflictableTransactionResult<T, SwapError> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

fn tx_encode<T: minicbor::Encode<()>>(
    value: &T,
) -> ConflictableTransactionResult<Vec<u8>, SwapError> {
    store::encode(value).map_err(ConflictableTransactionError::Abort)
}

fn tx_fetch<T>(
    tx: &TransactionalTree,
    kind: &'static str,
    key: &[u8],
) -> ConflictableTransactionResult<T, SwapError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx.get(key)? {
        Some(raw) => store::decode(key, &raw).map_err(ConflictableTransactionError::Abort),
        None => abort(SwapError::not_found(kind, String::from_utf8_lossy(key))),
    }
}

// Completion takes a product off the market and releases its hold, in the
// same transaction that advances the swap status.
fn flip_unavailable(
    tx: &TransactionalTree,
    product_id: &ProductId,
    now: &TimeStamp<Utc>,
) -> ConflictableTransactionResult<(), SwapError> {
    let key = product_id.as_str().as_bytes().to_vec();
    let mut product: Product = tx_fetch(tx, "product", &key)?;
    product.is_available = false;
    product.version += 1;
    product.updated_at = now.clone();
    tx.insert(key.as_slice(), tx_encode(&product)?)?;
    tx.remove(store::hold_key(product_id).as_slice())?;
    Ok(())
}

pub struct SwapService {
    store: SwapStore,
    events: EventEmitter,
}

impl SwapService {
    pub fn new(db: Arc<sled::Db>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store: SwapStore::new(db),
            events: EventEmitter::spawn(sink),
        }
    }

    pub fn store(&self) -> &SwapStore {
        &self.store
    }

    fn run<T>(
        &self,
        f: impl Fn(&TransactionalTree) -> ConflictableTransactionResult<T, SwapError>,
    ) -> Result<T, SwapError> {
        self.store.db().transaction(f).map_err(|err| match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => SwapError::Storage(err),
        })
    }

    // ---- catalog -----------------------------------------------------

    /// Sign up a new user. Emails are unique; the claim and the identity
    /// record are written together.
    pub fn register_user(&self, draft: UserDraft) -> Result<User, SwapError> {
        let user = draft.build()?;
        let user_key = user.user_id.as_str().as_bytes().to_vec();
        let email_key = store::email_key(&user.email);

        self.run(|tx| {
            if tx.get(&email_key)?.is_some() {
                return abort(ConflictError::EmailTaken(user.email.clone()));
            }
            tx.insert(email_key.as_slice(), user.user_id.as_str().as_bytes())?;
            tx.insert(user_key.as_slice(), tx_encode(&user)?)?;
            Ok(())
        })?;

        Ok(user)
    }

    /// Put a validated listing on the market.
    pub fn list_product(&self, draft: ProductDraft) -> Result<Product, SwapError> {
        let product = draft.build()?;
        self.user(&product.owner)?;
        self.store.put_product(&product)?;
        Ok(product)
    }

    /// Tombstone a listing. The row stays (swap and review history keeps
    /// referencing it) but it can never be offered again. In-flight swaps
    /// holding the product are unaffected. Delisting twice is a no-op.
    pub fn delist_product(&self, product_id: &ProductId) -> Result<Product, SwapError> {
        let now = TimeStamp::new();
        let key = product_id.as_str().as_bytes().to_vec();

        self.run(|tx| {
            let mut product: Product = tx_fetch(tx, "product", &key)?;
            if !product.state.is_active() {
                return Ok(product);
            }
            product.delist(now.clone());
            tx.insert(key.as_slice(), tx_encode(&product)?)?;
            Ok(product)
        })
    }

    // ---- reads -------------------------------------------------------

    pub fn user(&self, id: &UserId) -> Result<User, SwapError> {
        self.store
            .user(id)?
            .ok_or_else(|| SwapError::not_found("user", id))
    }

    pub fn product(&self, id: &ProductId) -> Result<Product, SwapError> {
        self.store
            .product(id)?
            .ok_or_else(|| SwapError::not_found("product", id))
    }

    pub fn swap_request(&self, id: &RequestId) -> Result<SwapRequest, SwapError> {
        self.store
            .request(id)?
            .ok_or_else(|| SwapError::not_found("swap request", id))
    }

    pub fn swap_transaction(&self, id: &SwapId) -> Result<SwapTransaction, SwapError> {
        self.store
            .swap(id)?
            .ok_or_else(|| SwapError::not_found("swap transaction", id))
    }

    pub fn review(
        &self,
        reviewer: &UserId,
        reviewee: &UserId,
        product: &ProductId,
    ) -> Result<Option<Review>, SwapError> {
        self.store.review(reviewer, reviewee, product)
    }

    // ---- lifecycle ---------------------------------------------------

    /// Open a swap request against a target product, optionally offering
    /// one of the requester's own products in exchange.
    pub fn create_swap_request(
        &self,
        requester: &UserId,
        target_product: &ProductId,
        offered_product: Option<&ProductId>,
        message: Option<&str>,
    ) -> Result<SwapRequest, SwapError> {
        let requester_row = self.user(requester)?;
        let target = self.product(target_product)?;
        let offered = offered_product.map(|id| self.product(id)).transpose()?;
        validate::can_create_swap_request(&requester_row, &target, offered.as_ref())?;

        let request = SwapRequest::open(
            requester.clone(),
            target_product.clone(),
            offered_product.cloned(),
            message.map(str::to_owned),
            TimeStamp::new(),
        );
        self.store.put_request(&request)?;

        self.events.emit(LifecycleEvent::SwapRequested {
            request: request.request_id.clone(),
        });
        Ok(request)
    }

    pub fn respond_to_swap_request(
        &self,
        request_id: &RequestId,
        decision: SwapDecision,
    ) -> Result<SwapOutcome, SwapError> {
        match decision {
            SwapDecision::Accept => self.accept(request_id).map(SwapOutcome::Accepted),
            SwapDecision::Reject => self.reject(request_id).map(SwapOutcome::Rejected),
        }
    }

    // Acceptance pairs the request with its transaction and claims the
    // product holds. The status re-check and the hold claims happen inside
    // the transaction, so two concurrent accepts over a shared product
    // cannot both commit; the loser sees ProductUnavailable or
    // AlreadyResolved.
    fn accept(&self, request_id: &RequestId) -> Result<SwapTransaction, SwapError> {
        let swap_id = SwapId::new();
        let now = TimeStamp::new();
        let request_key = request_id.as_str().as_bytes().to_vec();

        let swap = self.run(|tx| {
            let mut request: SwapRequest = tx_fetch(tx, "swap request", &request_key)?;
            if request.status != SwapStatus::Pending {
                return abort(ConflictError::AlreadyResolved(
                    request.request_id.to_string(),
                ));
            }

            let target: Product =
                tx_fetch(tx, "product", request.target_product.as_str().as_bytes())?;
            if !target.offerable() || tx.get(store::hold_key(&request.target_product))?.is_some()
            {
                return abort(ValidationError::ProductUnavailable(
                    request.target_product.clone(),
                ));
            }
            if let Some(offered_id) = &request.offered_product {
                let offered: Product = tx_fetch(tx, "product", offered_id.as_str().as_bytes())?;
                if !offered.offerable() || tx.get(store::hold_key(offered_id))?.is_some() {
                    return abort(ValidationError::ProductUnavailable(offered_id.clone()));
                }
            }

            let swap =
                SwapTransaction::open(&request, target.owner.clone(), swap_id.clone(), now.clone());
            tx.insert(swap.swap_id.as_str().as_bytes(), tx_encode(&swap)?)?;
            for product in swap.products() {
                tx.insert(
                    store::hold_key(product).as_slice(),
                    swap.swap_id.as_str().as_bytes(),
                )?;
                tx.insert(
                    store::history_key(product, &swap.swap_id).as_slice(),
                    &[] as &[u8],
                )?;
            }

            request.status = SwapStatus::Accepted;
            request.swap = Some(swap.swap_id.clone());
            request.version += 1;
            request.updated_at = now.clone();
            tx.insert(request_key.as_slice(), tx_encode(&request)?)?;

            Ok(swap)
        })?;

        self.events.emit(LifecycleEvent::SwapAccepted {
            request: request_id.clone(),
            swap: swap.swap_id.clone(),
        });
        Ok(swap)
    }

    fn reject(&self, request_id: &RequestId) -> Result<SwapRequest, SwapError> {
        let now = TimeStamp::new();
        let request_key = request_id.as_str().as_bytes().to_vec();

        let request = self.run(|tx| {
            let mut request: SwapRequest = tx_fetch(tx, "swap request", &request_key)?;
            if let Err(err) = validate::can_transition_request(request.status, SwapStatus::Rejected)
            {
                if request.status.is_terminal() {
                    return abort(ConflictError::AlreadyResolved(
                        request.request_id.to_string(),
                    ));
                }
                return abort(err);
            }

            request.status = SwapStatus::Rejected;
            request.version += 1;
            request.updated_at = now.clone();
            tx.insert(request_key.as_slice(), tx_encode(&request)?)?;
            Ok(request)
        })?;

        self.events.emit(LifecycleEvent::SwapRejected {
            request: request.request_id.clone(),
        });
        Ok(request)
    }

    /// Cancel a request, or an accepted request/transaction pair. Pairs go
    /// down together and their product holds are released; availability
    /// itself is untouched.
    pub fn cancel_swap(&self, target: impl Into<SwapRef>) -> Result<(), SwapError> {
        let target = target.into();
        let now = TimeStamp::new();

        let (request_id, swap_id) = self.run(|tx| {
            let (mut request, swap) = match &target {
                SwapRef::Request(id) => {
                    let request: SwapRequest =
                        tx_fetch(tx, "swap request", id.as_str().as_bytes())?;
                    let swap = match &request.swap {
                        Some(swap_id) => Some(tx_fetch::<SwapTransaction>(
                            tx,
                            "swap transaction",
                            swap_id.as_str().as_bytes(),
                        )?),
                        None => None,
                    };
                    (request, swap)
                }
                SwapRef::Swap(id) => {
                    let swap: SwapTransaction =
                        tx_fetch(tx, "swap transaction", id.as_str().as_bytes())?;
                    let request: SwapRequest =
                        tx_fetch(tx, "swap request", swap.request.as_str().as_bytes())?;
                    (request, Some(swap))
                }
            };

            if request.status.is_terminal() {
                return abort(ConflictError::AlreadyResolved(
                    request.request_id.to_string(),
                ));
            }
            if let Err(err) = validate::can_transition_request(request.status, SwapStatus::Cancelled)
            {
                return abort(err);
            }

            let mut cancelled_swap = None;
            if let Some(mut swap) = swap {
                if swap.status.is_terminal() {
                    return abort(ConflictError::AlreadyResolved(swap.swap_id.to_string()));
                }
                if let Err(err) = validate::can_transition_swap(swap.status, SwapStatus::Cancelled)
                {
                    return abort(err);
                }

                swap.status = SwapStatus::Cancelled;
                swap.version += 1;
                swap.updated_at = now.clone();
                tx.insert(swap.swap_id.as_str().as_bytes(), tx_encode(&swap)?)?;
                for product in swap.products() {
                    tx.remove(store::hold_key(product).as_slice())?;
                }
                cancelled_swap = Some(swap.swap_id.clone());
            }

            request.status = SwapStatus::Cancelled;
            request.version += 1;
            request.updated_at = now.clone();
            tx.insert(request.request_id.as_str().as_bytes(), tx_encode(&request)?)?;

            Ok((request.request_id.clone(), cancelled_swap))
        })?;

        self.events.emit(LifecycleEvent::SwapCancelled {
            request: request_id,
            swap: swap_id,
        });
        Ok(())
    }

    /// Drive an active swap to completion: stamp `completed_at`, take both
    /// products off the market and close the originating request, all in
    /// one transaction.
    pub fn complete_swap(&self, swap_id: &SwapId) -> Result<SwapTransaction, SwapError> {
        let now = TimeStamp::new();
        let swap_key = swap_id.as_str().as_bytes().to_vec();

        let swap = self.run(|tx| {
            let mut swap: SwapTransaction = tx_fetch(tx, "swap transaction", &swap_key)?;
            if swap.status.is_terminal() {
                return abort(ConflictError::AlreadyResolved(swap.swap_id.to_string()));
            }
            if let Err(err) = validate::can_transition_swap(swap.status, SwapStatus::Completed) {
                return abort(err);
            }

            let mut request: SwapRequest =
                tx_fetch(tx, "swap request", swap.request.as_str().as_bytes())?;
            if let Err(err) = validate::can_transition_request(request.status, SwapStatus::Completed)
            {
                return abort(err);
            }

            swap.status = SwapStatus::Completed;
            swap.completed_at = Some(now.clone());
            swap.version += 1;
            swap.updated_at = now.clone();
            tx.insert(swap_key.as_slice(), tx_encode(&swap)?)?;

            flip_unavailable(tx, &swap.owner_product, &now)?;
            if let Some(offered) = &swap.offered_product {
                flip_unavailable(tx, offered, &now)?;
            }

            request.status = SwapStatus::Completed;
            request.version += 1;
            request.updated_at = now.clone();
            tx.insert(request.request_id.as_str().as_bytes(), tx_encode(&request)?)?;

            Ok(swap)
        })?;

        self.events.emit(LifecycleEvent::SwapCompleted {
            request: swap.request.clone(),
            swap: swap.swap_id.clone(),
        });
        Ok(swap)
    }

    /// Submit a review for the counterparty of a completed swap. The
    /// eligibility gate answers first; the triple-keyed conditional insert
    /// has the final word on duplicates.
    pub fn submit_review(
        &self,
        reviewer: &UserId,
        reviewee: &UserId,
        product: &ProductId,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Review, SwapError> {
        let rating = Rating::new(rating)?;
        can_review(&self.store, reviewer, reviewee, product)?;

        let review = Review {
            product: product.clone(),
            reviewer: reviewer.clone(),
            reviewee: reviewee.clone(),
            rating,
            comment: comment.map(str::to_owned),
            created_at: TimeStamp::new(),
        };

        let key = store::review_key(reviewer, reviewee, product);
        let encoded = store::encode(&review)?;
        if self
            .store
            .db()
            .compare_and_swap(key, None::<&[u8]>, Some(encoded))?
            .is_err()
        {
            return Err(ConflictError::DuplicateReview {
                reviewer: reviewer.clone(),
                reviewee: reviewee.clone(),
                product: product.clone(),
            }
            .into());
        }

        self.events.emit(LifecycleEvent::ReviewSubmitted {
            reviewer: reviewer.clone(),
            reviewee: reviewee.clone(),
            product: product.clone(),
        });
        Ok(review)
    }
}
