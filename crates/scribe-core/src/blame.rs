//! Actor resolution from the ambient security context.

use std::sync::{PoisonError, RwLock};

use crate::entity::EntitySnapshot;

/// Authentication state of the current request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityToken {
    /// `None` for anonymous tokens.
    pub user: Option<EntitySnapshot>,
}

impl SecurityToken {
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user: None }
    }

    #[must_use]
    pub const fn authenticated(user: EntitySnapshot) -> Self {
        Self { user: Some(user) }
    }
}

/// Holder of the current security token, set by the host around each request.
#[derive(Debug, Default)]
pub struct TokenStorage {
    token: RwLock<Option<SecurityToken>>,
}

impl TokenStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: SecurityToken) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn token(&self) -> Option<SecurityToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Resolves the acting user for a change.
pub trait Blame {
    /// The acting user, or `None` for anonymous or unauthenticated changes.
    /// Never fails.
    fn blame(&self, token: Option<&SecurityToken>) -> Option<EntitySnapshot>;
}

/// Blames the authenticated user of the current token.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenBlamer;

impl Blame for TokenBlamer {
    fn blame(&self, token: Option<&SecurityToken>) -> Option<EntitySnapshot> {
        token.and_then(|t| t.user.clone())
    }
}
