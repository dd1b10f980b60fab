use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

use super::{Doc, DocBase, Location};
use crate::core::parser::Parser;
use crate::error::Result;

/// Lazily filled views shared by modules and classes
#[derive(Debug, Default)]
pub struct NamespaceState {
    members: OnceCell<IndexMap<String, Doc>>,
    by_origin: OnceCell<IndexMap<Location, Vec<Doc>>>,
    lookups: RefCell<HashMap<String, Option<Doc>>>,
}

/// A documentation object that owns named children: a module or a class
pub trait Namespace {
    fn base(&self) -> &DocBase;

    fn state(&self) -> &NamespaceState;

    fn parser(&self) -> Option<&Rc<dyn Parser>>;

    /// Members declared at this namespace's own location
    fn own_members(&self) -> Vec<Doc>;

    /// Resolve the members, propagating resolver failures
    fn try_members(&self) -> Result<&IndexMap<String, Doc>> {
        self.state().members.get_or_try_init(|| match self.parser() {
            Some(parser) => parser.members(),
            None => Ok(IndexMap::new()),
        })
    }

    /// Every member by name, in resolver order; empty when resolution failed
    fn members(&self) -> &IndexMap<String, Doc> {
        match self.try_members() {
            Ok(members) => members,
            Err(e) => {
                warn!("Cannot resolve members of {}: {}", self.base().fullname(), e);
                self.state().members.get_or_init(IndexMap::new)
            }
        }
    }

    /// Members grouped by the location of the namespace declaring them
    fn members_by_origin(&self) -> &IndexMap<Location, Vec<Doc>> {
        self.state().by_origin.get_or_init(|| {
            let mut locations: IndexMap<Location, Vec<Doc>> = IndexMap::new();
            for member in self.members().values() {
                let (module, qualname) = member.taken_from();
                let parent = qualname.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
                locations
                    .entry((module.clone(), parent.to_string()))
                    .or_default()
                    .push(member.clone());
            }
            locations
        })
    }

    /// Members grouped by ancestor, without the ones declared here
    fn inherited_members(&self) -> IndexMap<Location, Vec<Doc>> {
        let base = self.base();
        let own = base.location();
        self.members_by_origin()
            .iter()
            .filter(|(location, _)| **location != base.taken_from && **location != own)
            .map(|(location, members)| (location.clone(), members.clone()))
            .collect()
    }

    /// Own members followed by the classes nested in them, recursively
    fn flattened_own_members(&self) -> Vec<Doc> {
        let mut flattened = Vec::new();
        for member in self.own_members() {
            let nested = member.as_class().map(|class| class.flattened_own_members());
            flattened.push(member);
            if let Some(nested) = nested {
                flattened.extend(nested.into_iter().filter(|doc| matches!(doc, Doc::Class(_))));
            }
        }
        flattened
    }

    /// Look a dotted identifier up, descending into nested classes
    fn get(&self, identifier: &str) -> Option<Doc> {
        if let Some(found) = self.state().lookups.borrow().get(identifier) {
            return found.clone();
        }
        let found = match identifier.split_once('.') {
            Some((head, tail)) => match self.members().get(head) {
                Some(Doc::Class(class)) => class.get(tail),
                _ => None,
            },
            None => self.members().get(identifier).cloned(),
        };
        self.state()
            .lookups
            .borrow_mut()
            .insert(identifier.to_string(), found.clone());
        found
    }
}
