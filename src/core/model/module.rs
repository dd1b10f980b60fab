use once_cell::unsync::OnceCell;
use std::fmt;
use std::rc::Rc;

use super::{children, doc_suffix, Class, Doc, DocBase, Function, Location, Namespace, NamespaceState, Variable};
use crate::core::inspect;
use crate::core::parser::Parser;
use crate::core::program::PyRef;

/// A module, or a page of a documentation tree
#[derive(Debug)]
pub struct Module {
    base: DocBase,
    obj: Option<PyRef>,
    parser: Option<Rc<dyn Parser>>,
    state: NamespaceState,
    docstring: OnceCell<String>,
    submodules: OnceCell<Vec<Rc<Module>>>,
}

impl Module {
    pub fn new(
        modulename: impl Into<String>,
        qualname: impl Into<String>,
        obj: Option<PyRef>,
        taken_from: Location,
        parser: Option<Rc<dyn Parser>>,
    ) -> Self {
        Self {
            base: DocBase::new(modulename, qualname, taken_from),
            obj,
            parser,
            state: NamespaceState::default(),
            docstring: OnceCell::new(),
            submodules: OnceCell::new(),
        }
    }

    pub fn obj(&self) -> Option<&PyRef> {
        self.obj.as_ref()
    }

    pub fn docstring(&self) -> &str {
        self.docstring
            .get_or_init(|| self.obj.as_ref().map(inspect::safe_getdoc).unwrap_or_default())
    }

    pub(crate) fn set_docstring(&mut self, docstring: String) {
        self.docstring = OnceCell::from(docstring);
    }

    /// Backed by a directory
    pub fn is_package(&self) -> bool {
        self.obj.as_ref().is_some_and(inspect::is_package)
    }

    pub fn variables(&self) -> Vec<Rc<Variable>> {
        self.members().values().filter_map(|m| m.as_variable().cloned()).collect()
    }

    pub fn functions(&self) -> Vec<Rc<Function>> {
        self.members().values().filter_map(|m| m.as_function().cloned()).collect()
    }

    pub fn classes(&self) -> Vec<Rc<Class>> {
        self.members().values().filter_map(|m| m.as_class().cloned()).collect()
    }

    pub fn submodules(&self) -> &[Rc<Module>] {
        self.submodules
            .get_or_init(|| self.parser.as_ref().map(|p| p.submodules()).unwrap_or_default())
    }
}

impl Namespace for Module {
    fn base(&self) -> &DocBase {
        &self.base
    }

    fn state(&self) -> &NamespaceState {
        &self.state
    }

    fn parser(&self) -> Option<&Rc<dyn Parser>> {
        self.parser.as_ref()
    }

    fn own_members(&self) -> Vec<Doc> {
        self.members().values().cloned().collect()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_identity(&other.base) && self.obj == other.obj && same_parser(&self.parser, &other.parser)
    }
}

pub(super) fn same_parser(a: &Option<Rc<dyn Parser>>, b: &Option<Rc<dyn Parser>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.key() == b.key(),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<module {}{}{}>",
            self.base.fullname(),
            doc_suffix(&self.base, self.docstring()),
            children(self)
        )
    }
}

