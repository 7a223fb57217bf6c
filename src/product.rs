//! Product listings and their availability state
use crate::error::ValidationError;
use crate::ids::{ProductId, TimeStamp, UserId};
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Condition {
    #[n(0)]
    New,
    #[n(1)]
    LikeNew,
    #[n(2)]
    Used,
    #[n(3)]
    Damaged,
}

/// Tombstone state. A removed product keeps its row (swap and review
/// history reference it) but can never be offered again.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub enum ProductState {
    #[n(0)]
    Active,
    #[n(1)]
    Deleted(#[n(0)] TimeStamp<Utc>),
}

impl ProductState {
    pub fn is_active(&self) -> bool {
        matches!(self, ProductState::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct GeoPoint {
    #[n(0)]
    pub latitude: f64,
    #[n(1)]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Product {
    #[n(0)]
    pub product_id: ProductId,
    #[n(1)]
    pub owner: UserId,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: Option<String>,
    #[n(4)]
    pub condition: Condition,
    #[n(5)]
    pub category: Option<String>,
    #[n(6)]
    pub desired_items: Option<String>,
    /// Estimated value in minor currency units.
    #[n(7)]
    pub estimated_value: Option<u64>,
    #[n(8)]
    pub location: Option<GeoPoint>,
    #[n(9)]
    pub address: Option<String>,
    #[n(10)]
    pub tags: Vec<String>,
    #[n(11)]
    pub is_available: bool,
    #[n(12)]
    pub state: ProductState,
    #[n(13)]
    pub version: u64,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub updated_at: TimeStamp<Utc>,
}

impl Product {
    /// Whether the product may appear in a new swap request, as either
    /// the target or the offered side.
    pub fn offerable(&self) -> bool {
        self.is_available && self.state.is_active()
    }

    pub(crate) fn delist(&mut self, at: TimeStamp<Utc>) {
        self.state = ProductState::Deleted(at.clone());
        self.version += 1;
        self.updated_at = at;
    }
}

// used for constructing listings
#[derive(Default)]
pub struct ProductDraft {
    owner: Option<UserId>,
    title: Option<String>,
    description: Option<String>,
    condition: Option<Condition>,
    category: Option<String>,
    desired_items: Option<String>,
    estimated_value: Option<u64>,
    location: Option<GeoPoint>,
    address: Option<String>,
    tags: Vec<String>,
}

impl ProductDraft {
    /// Construct a new builder object, this becomes the basis for a listing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_owned());
        self
    }

    pub fn desired_items(mut self, desired: &str) -> Self {
        self.desired_items = Some(desired.to_owned());
        self
    }

    pub fn estimated_value(mut self, value: u64) -> Self {
        self.estimated_value = Some(value);
        self
    }

    pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPoint {
            latitude,
            longitude,
        });
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_owned());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_owned());
        self
    }

    // Checks required fields, then mints the listing. New listings always
    // start out available and active.
    pub fn build(self) -> Result<Product, ValidationError> {
        let owner = self.owner.ok_or(ValidationError::MissingField("owner"))?;
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingField("title"))?;
        let condition = self
            .condition
            .ok_or(ValidationError::MissingField("condition"))?;

        let now = TimeStamp::new();
        Ok(Product {
            product_id: ProductId::new(),
            owner,
            title,
            description: self.description,
            condition,
            category: self.category,
            desired_items: self.desired_items,
            estimated_value: self.estimated_value,
            location: self.location,
            address: self.address,
            tags: self.tags,
            is_available: true,
            state: ProductState::Active,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}
