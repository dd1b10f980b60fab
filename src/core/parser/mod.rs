//! Member resolvers and the registry of parser suites.
//!
//! A parser suite groups the resolvers for one kind of input: live program
//! objects (`SourceCode`) or pre-built documentation trees (`reST`).

pub mod rest;
pub mod source_code;
pub mod stubs;
pub mod variable_scanner;

pub use rest::{CommandDocTreeBuilder, ReStParserSuite};
pub use source_code::{SourceCodeOptions, SourceCodeParserSuite};

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::core::model::{Doc, Module};
use crate::core::program::PyRef;
use crate::error::{DocprobeError, Result};

/// Produces the documented members of one namespace
pub trait Parser: fmt::Debug {
    /// Every member by name, in declaration order
    fn members(&self) -> Result<IndexMap<String, Doc>>;

    /// Child modules, for resolvers of packages and documentation pages
    fn submodules(&self) -> Vec<Rc<Module>> {
        Vec::new()
    }

    /// Identity of the resolver, used when comparing namespaces
    fn key(&self) -> ParserKey;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParserKey {
    SourceCodeModule(PyRef),
    SourceCodeClass(PyRef),
    ReSt { path: String, suite: usize },
}

/// The resolver a suite uses for one kind of member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    SourceCodeModule,
    SourceCodeClass,
    ReSt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserSuiteKind {
    SourceCode,
    ReSt,
}

impl ParserSuiteKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceCode => "SourceCode",
            Self::ReSt => "reST",
        }
    }

    /// Resolver for `"module"`, `"class"` or `"default"`; unknown keys get the default
    pub fn parser_type(&self, key: &str) -> ParserKind {
        match (self, key) {
            (Self::SourceCode, "class") => ParserKind::SourceCodeClass,
            (Self::SourceCode, _) => ParserKind::SourceCodeModule,
            (Self::ReSt, _) => ParserKind::ReSt,
        }
    }
}

/// Parser suites by name
#[derive(Debug, Clone)]
pub struct ParserSuitesRegistry {
    suites: IndexMap<String, ParserSuiteKind>,
}

impl ParserSuitesRegistry {
    pub fn new() -> Self {
        let mut registry = Self { suites: IndexMap::new() };
        for kind in [ParserSuiteKind::SourceCode, ParserSuiteKind::ReSt] {
            registry.register(kind.name(), kind);
        }
        registry
    }

    /// Register a suite under `name`; an existing registration is kept
    pub fn register(&mut self, name: impl Into<String>, kind: ParserSuiteKind) {
        self.suites.entry(name.into()).or_insert(kind);
    }

    pub fn get(&self, name: &str) -> Result<ParserSuiteKind> {
        self.suites
            .get(name)
            .copied()
            .ok_or_else(|| DocprobeError::UnknownParserSuite(name.to_string()))
    }

    pub fn available_parser_suite_types(&self) -> Vec<String> {
        self.suites.keys().cloned().collect()
    }
}

impl Default for ParserSuitesRegistry {
    fn default() -> Self {
        Self::new()
    }
}
