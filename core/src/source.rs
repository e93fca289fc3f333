//! Capabilities the index needs from the domain layer.

use serde::{Deserialize, Serialize};

/// What kind of domain object an id resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainKind {
    /// A transcription of a fragment; the only kind search results may contain.
    Witness,
    Other(String),
}

/// Maps index ids back to live domain objects.
pub trait Resolver: Send + Sync {
    type Ref: Clone;

    /// `None` when the object no longer exists.
    fn resolve(&self, id: &str) -> Option<Self::Ref>;

    fn kind_of(&self, reference: &Self::Ref) -> DomainKind;
}

/// Produces the indexable view of a witness.
pub trait TextSource: Resolver {
    fn external_id(&self, reference: &Self::Ref) -> String;

    /// Plain text of the transcription.
    fn flatten_to_text(&self, reference: &Self::Ref) -> String;

    /// Whether this witness is the representative of its fragment.
    fn is_representative(&self, reference: &Self::Ref) -> bool;
}

/// A fragment, identified for caching, with the id of its representative witness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentRef {
    pub id: String,
    pub representative: String,
}

impl FragmentRef {
    pub fn new(id: impl Into<String>, representative: impl Into<String>) -> Self {
        Self { id: id.into(), representative: representative.into() }
    }
}
