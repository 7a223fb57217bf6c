use crate::error::ValidationError;
use crate::ids::{TimeStamp, UserId};
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Role {
    #[n(0)]
    Buyer,
    #[n(1)]
    Seller,
    #[n(2)]
    Admin,
}

/// Identity anchor. Users are retained forever; swap and review history
/// keeps referencing them, so no delete operation exists anywhere.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct User {
    #[n(0)]
    pub user_id: UserId,
    #[n(1)]
    pub external_auth_id: Option<String>,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub display_name: String,
    #[n(4)]
    pub role: Role,
    #[n(5)]
    pub is_verified: bool,
    #[n(6)]
    pub accepted_terms: bool,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub updated_at: TimeStamp<Utc>,
    #[n(9)]
    pub last_login: Option<TimeStamp<Utc>>,
}

// used for constructing sign-ups
#[derive(Default)]
pub struct UserDraft {
    email: Option<String>,
    display_name: Option<String>,
    role: Option<Role>,
    external_auth_id: Option<String>,
    is_verified: bool,
    accepted_terms: bool,
}

impl UserDraft {
    /// Construct a new builder object, this becomes the basis for a sign-up
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_owned());
        self
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_owned());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn external_auth_id(mut self, id: &str) -> Self {
        self.external_auth_id = Some(id.to_owned());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.is_verified = verified;
        self
    }

    pub fn accepted_terms(mut self, accepted: bool) -> Self {
        self.accepted_terms = accepted;
        self
    }

    // Checks required fields, then mints the identity record
    pub fn build(self) -> Result<User, ValidationError> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(ValidationError::MissingField("email"))?;
        let display_name = self
            .display_name
            .filter(|n| !n.trim().is_empty())
            .ok_or(ValidationError::MissingField("display_name"))?;

        let now = TimeStamp::new();
        Ok(User {
            user_id: UserId::new(),
            external_auth_id: self.external_auth_id,
            email,
            display_name,
            role: self.role.unwrap_or(Role::Buyer),
            is_verified: self.is_verified,
            accepted_terms: self.accepted_terms,
            created_at: now.clone(),
            updated_at: now,
            last_login: None,
        })
    }
}
