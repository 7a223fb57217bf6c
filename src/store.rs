//! Typed access to the sled keyspace backing the engine
//!
//! Every record lives in the db's default tree, CBOR-encoded and keyed by
//! its id string; the bech32 hrp of each id keeps the families apart.
//! Beside the entity records sit the derived key families the engine
//! maintains transactionally:
//!
//! - `hold_<product>` -> swap id: the at-most-one-active-swap-per-product
//!   claim, taken at acceptance and released on cancel/complete
//! - `hist_<product>/<swap>`: per-product swap history, append-only
//! - `rev_<reviewer>/<reviewee>/<product>` -> review: the review
//!   uniqueness triple is the key itself
//! - `email_<email>` -> user id: unique-email claim

use crate::error::SwapError;
use crate::ids::{ProductId, RequestId, SwapId, UserId};
use crate::product::Product;
use crate::review::Review;
use crate::swap::{SwapRequest, SwapTransaction};
use crate::user::User;
use std::sync::Arc;

pub(crate) fn hold_key(product: &ProductId) -> Vec<u8> {
    format!("hold_{product}").into_bytes()
}

pub(crate) fn history_key(product: &ProductId, swap: &SwapId) -> Vec<u8> {
    format!("hist_{product}/{swap}").into_bytes()
}

fn history_prefix(product: &ProductId) -> Vec<u8> {
    format!("hist_{product}/").into_bytes()
}

pub(crate) fn review_key(reviewer: &UserId, reviewee: &UserId, product: &ProductId) -> Vec<u8> {
    format!("rev_{reviewer}/{reviewee}/{product}").into_bytes()
}

pub(crate) fn email_key(email: &str) -> Vec<u8> {
    format!("email_{email}").into_bytes()
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, SwapError> {
    minicbor::to_vec(value).map_err(|err| SwapError::Codec {
        key: String::new(),
        detail: err.to_string(),
    })
}

pub(crate) fn decode<T>(key: &[u8], raw: &[u8]) -> Result<T, SwapError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(raw).map_err(|err| SwapError::Codec {
        key: String::from_utf8_lossy(key).into_owned(),
        detail: err.to_string(),
    })
}

/// Read surface over the keyspace. All mutation goes through the service
/// layer's transactions; the store itself only offers point reads, the
/// derived-index scans and the handful of plain inserts that need no
/// cross-record atomicity.
pub struct SwapStore {
    db: Arc<sled::Db>,
}

impl SwapStore {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &sled::Db {
        &self.db
    }

    fn fetch<T>(&self, key: &[u8]) -> Result<Option<T>, SwapError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.db.get(key)? {
            Some(raw) => Ok(Some(decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn user(&self, id: &UserId) -> Result<Option<User>, SwapError> {
        self.fetch(id.as_str().as_bytes())
    }

    pub fn product(&self, id: &ProductId) -> Result<Option<Product>, SwapError> {
        self.fetch(id.as_str().as_bytes())
    }

    pub fn request(&self, id: &RequestId) -> Result<Option<SwapRequest>, SwapError> {
        self.fetch(id.as_str().as_bytes())
    }

    pub fn swap(&self, id: &SwapId) -> Result<Option<SwapTransaction>, SwapError> {
        self.fetch(id.as_str().as_bytes())
    }

    pub fn review(
        &self,
        reviewer: &UserId,
        reviewee: &UserId,
        product: &ProductId,
    ) -> Result<Option<Review>, SwapError> {
        self.fetch(&review_key(reviewer, reviewee, product))
    }

    /// The swap currently holding `product`, if any.
    pub fn active_swap_for_product(
        &self,
        product: &ProductId,
    ) -> Result<Option<SwapId>, SwapError> {
        let raw = self.db.get(hold_key(product))?;
        Ok(raw.map(|ivec| SwapId::from_raw(String::from_utf8_lossy(&ivec).into_owned())))
    }

    /// Every swap that ever referenced `product`, via the history index.
    pub fn swaps_for_product(
        &self,
        product: &ProductId,
    ) -> Result<Vec<SwapTransaction>, SwapError> {
        let prefix = history_prefix(product);
        let mut swaps = Vec::new();

        for entry in self.db.scan_prefix(&prefix) {
            let (key, _) = entry?;
            let Some(suffix) = key.strip_prefix(prefix.as_slice()) else {
                continue;
            };
            let swap_id = SwapId::from_raw(String::from_utf8_lossy(suffix).into_owned());
            if let Some(swap) = self.swap(&swap_id)? {
                swaps.push(swap);
            }
        }

        Ok(swaps)
    }

    pub(crate) fn put_request(&self, request: &SwapRequest) -> Result<(), SwapError> {
        self.db
            .insert(request.request_id.as_str().as_bytes(), encode(request)?)?;
        Ok(())
    }

    pub(crate) fn put_product(&self, product: &Product) -> Result<(), SwapError> {
        self.db
            .insert(product.product_id.as_str().as_bytes(), encode(product)?)?;
        Ok(())
    }
}
