use once_cell::unsync::OnceCell;
use std::fmt;
use std::rc::Rc;

use super::module::same_parser;
use super::{children, decorator_prefix, doc_suffix, Doc, DocBase, Function, Location, Namespace, NamespaceState, Variable};
use crate::core::inspect::{cleandoc, safe_getattr, safe_getdoc};
use crate::core::parser::Parser;
use crate::core::program::{PyObject, PyRef, DICT_DOC};
use crate::core::signature::{Parameter, Signature};

/// An immediate base class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    pub modulename: String,
    pub qualname: String,
    /// How the base is shown, e.g. `Generic[~T]` or `other.Parent`
    pub display: String,
}

#[derive(Debug)]
pub struct Class {
    base: DocBase,
    obj: Option<PyRef>,
    parser: Option<Rc<dyn Parser>>,
    state: NamespaceState,
    docstring: OnceCell<String>,
    signature: OnceCell<Signature>,
    signature_without_self: OnceCell<Signature>,
    bases: OnceCell<Vec<Base>>,
}

impl Class {
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
            signature: OnceCell::new(),
            signature_without_self: OnceCell::new(),
            bases: OnceCell::new(),
        }
    }

    pub fn obj(&self) -> Option<&PyRef> {
        self.obj.as_ref()
    }

    pub fn docstring(&self) -> &str {
        self.docstring.get_or_init(|| {
            let doc = self.obj.as_ref().map(safe_getdoc).unwrap_or_default();
            // mapping subclasses such as TypedDicts would show the dict docstring
            if doc == cleandoc(DICT_DOC) {
                String::new()
            } else {
                doc
            }
        })
    }

    pub(crate) fn set_docstring(&mut self, docstring: String) {
        self.docstring = OnceCell::from(docstring);
    }

    /// Signature of `__init__`, without a return annotation
    pub fn signature(&self) -> &Signature {
        self.signature.get_or_init(|| {
            match self.obj.as_ref().and_then(|obj| safe_getattr(obj, "__init__")) {
                Some(init) => Signature::of(&init, self.base.fullname()).without_return(),
                None => Signature::placeholder(),
            }
        })
    }

    pub fn signature_without_self(&self) -> &Signature {
        self.signature_without_self
            .get_or_init(|| self.signature().without_first())
    }

    /// Constructor parameters without `self`
    pub fn parameters(&self) -> &[Parameter] {
        &self.signature_without_self().parameters
    }

    /// Immediate bases, `object` excluded
    pub fn bases(&self) -> &[Base] {
        self.bases.get_or_init(|| {
            let Some(obj) = &self.obj else {
                return Vec::new();
            };
            let Some(class) = obj.object().as_class() else {
                return Vec::new();
            };
            let object = obj.program().builtins().object;
            class
                .orig_bases
                .as_ref()
                .unwrap_or(&class.bases)
                .iter()
                .filter(|id| **id != object)
                .filter_map(|id| self.describe_base(&obj.sibling(*id)))
                .collect()
        })
    }

    fn describe_base(&self, base: &PyRef) -> Option<Base> {
        let (modulename, qualname) = match base.object() {
            PyObject::GenericAlias(alias) => {
                let origin = base.program().class(alias.origin)?;
                return Some(Base {
                    modulename: origin.module.clone(),
                    qualname: origin.qualname.clone(),
                    display: alias.text.clone(),
                });
            }
            PyObject::Class(class) => (class.module.clone(), class.qualname.clone()),
            PyObject::Foreign { module, qualname } => (module.clone(), qualname.clone()),
            _ => return None,
        };
        let display = if modulename == self.base.modulename {
            qualname.clone()
        } else {
            format!("{}.{}", modulename, qualname)
        };
        Some(Base {
            modulename,
            qualname,
            display,
        })
    }

    /// Decorators as written, e.g. `@dataclass`
    pub fn decorators(&self) -> &[String] {
        match self.obj.as_ref().map(|o| o.object()) {
            Some(PyObject::Class(class)) => &class.decorators,
            _ => &[],
        }
    }

    /// Variables annotated with `ClassVar`
    pub fn class_variables(&self) -> Vec<Rc<Variable>> {
        self.variables().filter(|v| v.is_classvar()).collect()
    }

    /// Every variable that is not a class variable
    pub fn instance_variables(&self) -> Vec<Rc<Variable>> {
        self.variables().filter(|v| !v.is_classvar()).collect()
    }

    /// Functions that are neither class- nor staticmethods
    pub fn methods(&self) -> Vec<Rc<Function>> {
        self.functions()
            .filter(|f| !f.is_classmethod() && !f.is_staticmethod())
            .collect()
    }

    pub fn classmethods(&self) -> Vec<Rc<Function>> {
        self.functions().filter(|f| f.is_classmethod()).collect()
    }

    pub fn staticmethods(&self) -> Vec<Rc<Function>> {
        self.functions().filter(|f| f.is_staticmethod()).collect()
    }

    fn variables(&self) -> impl Iterator<Item = Rc<Variable>> + '_ {
        self.members().values().filter_map(|m| m.as_variable().cloned())
    }

    fn functions(&self) -> impl Iterator<Item = Rc<Function>> + '_ {
        self.members().values().filter_map(|m| m.as_function().cloned())
    }
}

impl Namespace for Class {
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
        let by_origin = self.members_by_origin();
        let location = self.base.location();
        let mut members = by_origin.get(&location).cloned().unwrap_or_default();
        // a class re-exported from a private module also owns the members
        // declared at its original location
        if self.base.taken_from != location {
            members.extend(by_origin.get(&self.base.taken_from).cloned().unwrap_or_default());
        }
        members
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_identity(&other.base) && self.obj == other.obj && same_parser(&self.parser, &other.parser)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}class {}.{}{}{}>",
            decorator_prefix(self.decorators()),
            self.base.modulename,
            self.base.qualname,
            doc_suffix(&self.base, self.docstring()),
            children(self)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::program::{LoadOptions, Program};
    use std::fs;

    #[test]
    fn test_bases_and_signature() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other.py"), "class Parent:\n    pass\n").unwrap();
        fs::write(
            dir.path().join("m.py"),
            r#"
from typing import Generic, TypeVar
from other import Parent

T = TypeVar("T")

class Local:
    pass

class Box(Local, Parent, Generic[T]):
    """A box."""

    def __init__(self, item: T, count: int = 1) -> None:
        pass

class Bare:
    pass

class Mapping(dict):
    pass
"#,
        )
        .unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        let module = PyRef::new(program.clone(), program.module_id("m").unwrap());

        let location = |q: &str| ("m".to_string(), q.to_string());
        let boxed = Class::new("m", "Box", safe_getattr(&module, "Box"), location("Box"), None);
        let displays: Vec<&str> = boxed.bases().iter().map(|b| b.display.as_str()).collect();
        assert_eq!(displays, ["Local", "other.Parent", "typing.Generic[~T]"]);
        assert_eq!(boxed.bases()[2].qualname, "Generic");
        assert_eq!(boxed.signature().to_string(), "(self, item: ~T, count: int = 1)");
        assert_eq!(boxed.parameters().len(), 2);
        assert_eq!(boxed.docstring(), "A box.");

        let bare = Class::new("m", "Bare", safe_getattr(&module, "Bare"), location("Bare"), None);
        assert!(bare.bases().is_empty());
        assert_eq!(bare.signature().to_string(), "(self, /, *args, **kwargs)");
        assert_eq!(bare.to_string(), "<class m.Bare>");

        let mapping = Class::new("m", "Mapping", safe_getattr(&module, "Mapping"), location("Mapping"), None);
        assert_eq!(mapping.docstring(), "");
    }

    #[test]
    fn test_unresolved_class() {
        let class = Class::new("m", "Gone", None, ("m".to_string(), "Gone".to_string()), None);
        assert_eq!(class.signature().to_string(), "(unknown)");
        assert!(class.members().is_empty());
        assert!(class.own_members().is_empty());
    }
}
