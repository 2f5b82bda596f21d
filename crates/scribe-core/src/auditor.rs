//! Process-wide audit configuration: metadata, filter, and resolvers.

use std::fmt;
use std::sync::Arc;

use crate::blame::{Blame, TokenBlamer, TokenStorage};
use crate::builder::RecordBuilder;
use crate::changes::ChangeSource;
use crate::entity::EntitySnapshot;
use crate::filter::EntityFilter;
use crate::label::{FieldLabeler, Label};
use crate::metadata::EntityRegistry;

/// Shared, read-only audit setup. One per process; each transaction borrows it.
///
/// By default entities are labeled with [`FieldLabeler`] and blamed on the
/// user of the shared [`TokenStorage`].
pub struct Auditor {
    registry: Arc<EntityRegistry>,
    filter: EntityFilter,
    labeler: Option<Box<dyn Label + Send + Sync>>,
    blamer: Option<Box<dyn Blame + Send + Sync>>,
    tokens: Arc<TokenStorage>,
}

impl Auditor {
    #[must_use]
    pub fn new(registry: EntityRegistry) -> Self {
        let registry = Arc::new(registry);
        let mut labeler = FieldLabeler::new();
        labeler.attach(Arc::clone(&registry));
        Self {
            registry,
            filter: EntityFilter::default(),
            labeler: Some(Box::new(labeler)),
            blamer: Some(Box::new(TokenBlamer)),
            tokens: Arc::new(TokenStorage::new()),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: EntityFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the labeler. The registry is attached to it here.
    #[must_use]
    pub fn with_labeler(mut self, mut labeler: impl Label + Send + Sync + 'static) -> Self {
        labeler.attach(Arc::clone(&self.registry));
        self.labeler = Some(Box::new(labeler));
        self
    }

    /// Label every reference "Unlabeled".
    #[must_use]
    pub fn without_labeler(mut self) -> Self {
        self.labeler = None;
        self
    }

    #[must_use]
    pub fn with_blamer(mut self, blamer: impl Blame + Send + Sync + 'static) -> Self {
        self.blamer = Some(Box::new(blamer));
        self
    }

    /// Never record an actor.
    #[must_use]
    pub fn without_blamer(mut self) -> Self {
        self.blamer = None;
        self
    }

    /// Share a token storage the host already sets per request.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<TokenStorage>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn filter(&self) -> &EntityFilter {
        &self.filter
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStorage> {
        &self.tokens
    }

    #[must_use]
    pub fn is_unaudited(&self, class: &str) -> bool {
        self.filter.is_unaudited(class, &self.registry)
    }

    /// The acting user according to the blamer and the current token.
    #[must_use]
    pub fn actor(&self) -> Option<EntitySnapshot> {
        let token = self.tokens.token();
        self.blamer.as_ref()?.blame(token.as_ref())
    }

    /// Record builder reading from `source`.
    #[must_use]
    pub fn builder<'a>(&'a self, source: &'a dyn ChangeSource) -> RecordBuilder<'a> {
        let labeler = self.labeler.as_deref().map(|l| l as &dyn Label);
        RecordBuilder::new(&self.registry, source, labeler)
    }
}

impl fmt::Debug for Auditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auditor")
            .field("entities", &self.registry.len())
            .field("filter", &self.filter)
            .field("labeler", &self.labeler.is_some())
            .field("blamer", &self.blamer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::blame::SecurityToken;
    use crate::metadata::EntityMeta;

    fn auditor() -> Auditor {
        Auditor::new(
            EntityRegistry::from_entities([EntityMeta::new("App\\Entity\\User", "users")])
                .unwrap(),
        )
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn auditor_is_shareable_across_threads() {
        assert_send_sync::<Auditor>();
    }

    #[test]
    fn actor_follows_the_shared_token() {
        let auditor = auditor();
        assert_eq!(auditor.actor(), None);

        let alice = EntitySnapshot::detached("App\\Entity\\User").with_field("id", 1);
        auditor
            .tokens()
            .set(SecurityToken::authenticated(alice.clone()));
        assert_eq!(auditor.actor(), Some(alice));
        assert_eq!(auditor.without_blamer().actor(), None);
    }

    #[test]
    fn filter_is_applied_through_the_registry() {
        let auditor = auditor().with_filter(EntityFilter::new().ignore(["App\\Entity\\User"]));
        assert!(auditor.is_unaudited("App\\Entity\\User"));
        assert!(!auditor.is_unaudited("App\\Entity\\Post"));
    }
}
