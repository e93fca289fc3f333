#![allow(dead_code)]

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use witness_index::{DomainKind, FragmentRef, IndexerConfig, IndexerService, Resolver, TextSource};

#[derive(Debug, Clone, PartialEq)]
pub struct Witness {
    pub id: String,
    pub fragment: String,
    pub text: String,
    pub representative: bool,
    pub kind: DomainKind,
}

/// In-memory domain registry standing in for the edition's repository.
#[derive(Default)]
pub struct Registry {
    witnesses: RwLock<HashMap<String, Witness>>,
}

impl Registry {
    pub fn insert(&self, id: &str, fragment: &str, text: &str, representative: bool) -> Witness {
        let witness = Witness {
            id: id.to_string(),
            fragment: fragment.to_string(),
            text: text.to_string(),
            representative,
            kind: DomainKind::Witness,
        };
        self.witnesses.write().insert(id.to_string(), witness.clone());
        witness
    }

    pub fn remove(&self, id: &str) {
        self.witnesses.write().remove(id);
    }

    pub fn set_kind(&self, id: &str, kind: DomainKind) {
        if let Some(w) = self.witnesses.write().get_mut(id) {
            w.kind = kind;
        }
    }

    pub fn fragment(&self, fragment: &str) -> FragmentRef {
        let witnesses = self.witnesses.read();
        let representative = witnesses
            .values()
            .find(|w| w.fragment == fragment && w.representative)
            .map(|w| w.id.clone())
            .unwrap_or_default();
        FragmentRef::new(fragment, representative)
    }
}

impl Resolver for Registry {
    type Ref = Witness;

    fn resolve(&self, id: &str) -> Option<Witness> {
        self.witnesses.read().get(id).cloned()
    }

    fn kind_of(&self, reference: &Witness) -> DomainKind {
        reference.kind.clone()
    }
}

impl TextSource for Registry {
    fn external_id(&self, reference: &Witness) -> String {
        reference.id.clone()
    }

    fn flatten_to_text(&self, reference: &Witness) -> String {
        reference.text.clone()
    }

    fn is_representative(&self, reference: &Witness) -> bool {
        reference.representative
    }
}

pub fn service(dir: &Path) -> (IndexerService<Registry>, Arc<Registry>) {
    service_with(IndexerConfig::new(dir))
}

pub fn service_with(config: IndexerConfig) -> (IndexerService<Registry>, Arc<Registry>) {
    let registry = Arc::new(Registry::default());
    let service = IndexerService::open(&config, Arc::clone(&registry)).unwrap();
    (service, registry)
}

/// Register and index a witness.
pub fn add(service: &IndexerService<Registry>, registry: &Registry, id: &str, fragment: &str, text: &str, rep: bool) {
    let witness = registry.insert(id, fragment, text, rep);
    service.add_document(&witness).unwrap();
}

pub fn ids(witnesses: &[Witness]) -> Vec<String> {
    witnesses.iter().map(|w| w.id.clone()).collect()
}
