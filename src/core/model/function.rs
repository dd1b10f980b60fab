use once_cell::unsync::OnceCell;
use std::fmt;

use super::{decorator_prefix, doc_suffix, DocBase, Location};
use crate::core::annotations::Annotation;
use crate::core::inspect::{object_module, object_name, object_qualname, safe_getattr, safe_getdoc};
use crate::core::program::{PyObject, PyRef, OBJECT_INIT_DOC};
use crate::core::signature::{Parameter, Signature};

/// A function or method, including `@classmethod`s and `@staticmethod`s
#[derive(Debug)]
pub struct Function {
    base: DocBase,
    /// The callable as declared, possibly wrapped in `classmethod`/`staticmethod`
    wrapped: Option<PyRef>,
    /// The unwrapped callable
    obj: Option<PyRef>,
    docstring: OnceCell<String>,
    signature: OnceCell<Signature>,
    signature_without_self: OnceCell<Signature>,
}

impl Function {
    pub fn new(
        modulename: impl Into<String>,
        qualname: impl Into<String>,
        func: Option<PyRef>,
        taken_from: Location,
    ) -> Self {
        let obj = func.as_ref().map(|f| match f.object() {
            PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => f.sibling(*inner),
            _ => f.clone(),
        });
        Self {
            base: DocBase::new(modulename, qualname, taken_from),
            wrapped: func,
            obj,
            docstring: OnceCell::new(),
            signature: OnceCell::new(),
            signature_without_self: OnceCell::new(),
        }
    }

    pub fn base(&self) -> &DocBase {
        &self.base
    }

    pub fn wrapped(&self) -> Option<&PyRef> {
        self.wrapped.as_ref()
    }

    pub fn obj(&self) -> Option<&PyRef> {
        self.obj.as_ref()
    }

    pub fn docstring(&self) -> &str {
        self.docstring.get_or_init(|| {
            let Some(obj) = &self.obj else {
                return String::new();
            };
            let mut doc = safe_getdoc(obj);
            if doc.is_empty() {
                doc = self.doc_from_defining_class(obj);
            }
            if doc == OBJECT_INIT_DOC {
                String::new()
            } else {
                doc
            }
        })
    }

    pub(crate) fn set_docstring(&mut self, docstring: String) {
        self.docstring = OnceCell::from(docstring);
    }

    /// Look the same name up again through the class path of the qualified
    /// name, which finds docstrings of inherited classmethods
    fn doc_from_defining_class(&self, obj: &PyRef) -> String {
        let (Some(module), Some(qualname)) = (object_module(obj), object_qualname(obj)) else {
            return String::new();
        };
        let Some(module) = obj.program().module_id(&module) else {
            return String::new();
        };
        let mut current = obj.sibling(module);
        let path: Vec<&str> = qualname.split('.').collect();
        for part in &path[..path.len() - 1] {
            match safe_getattr(&current, part) {
                Some(next) => current = next,
                None => return String::new(),
            }
        }
        safe_getattr(&current, self.base.name())
            .map(|found| safe_getdoc(&found))
            .unwrap_or_default()
    }

    pub fn is_classmethod(&self) -> bool {
        self.wrapped
            .as_ref()
            .is_some_and(|w| matches!(w.object(), PyObject::ClassMethod(_)))
    }

    pub fn is_staticmethod(&self) -> bool {
        self.wrapped
            .as_ref()
            .is_some_and(|w| matches!(w.object(), PyObject::StaticMethod(_)))
    }

    /// Decorators as written, e.g. `@functools.cache`
    pub fn decorators(&self) -> &[String] {
        match self.obj.as_ref().map(|o| o.object()) {
            Some(PyObject::Function(function)) => &function.decorators,
            _ => &[],
        }
    }

    /// `def` or `async def`
    pub fn funcdef(&self) -> &'static str {
        match self.obj.as_ref().map(|o| o.object()) {
            Some(PyObject::Function(function)) if function.is_async => "async def",
            _ => "def",
        }
    }

    /// Resolved signature; the `(unknown)` placeholder when it cannot be determined
    pub fn signature(&self) -> &Signature {
        self.signature.get_or_init(|| {
            let Some(obj) = &self.obj else {
                return Signature::placeholder();
            };
            // `object.__init__` would show a misleading `(self, /, *args, **kwargs)`
            if obj.id() == obj.program().builtins().object_init {
                return Signature::empty();
            }
            let signature = Signature::of(obj, self.base.fullname());
            if self.base.name() == "__init__" {
                signature.without_return()
            } else {
                signature
            }
        })
    }

    /// Like [`Function::signature`] without the first parameter
    pub fn signature_without_self(&self) -> &Signature {
        self.signature_without_self
            .get_or_init(|| self.signature().without_first())
    }

    /// Parameters without the leading `self` or `cls`
    pub fn parameters(&self) -> &[Parameter] {
        &self.signature_without_self().parameters
    }

    /// The return annotation
    pub fn annotations(&self) -> &Annotation {
        &self.signature().return_annotation
    }

    fn flavour(&self) -> &'static str {
        if self.is_classmethod() {
            "class"
        } else if self.is_staticmethod() {
            "static"
        } else if self.obj.as_ref().and_then(object_name).as_deref() != Some(self.base.qualname.as_str()) {
            "method"
        } else {
            "function"
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_identity(&other.base) && self.wrapped == other.wrapped
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = doc_suffix(&self.base, self.docstring());
        write!(
            f,
            "<{}{} {} {}{}{}>",
            decorator_prefix(self.decorators()),
            self.flavour(),
            self.funcdef(),
            self.base.name(),
            self.signature(),
            if suffix.is_empty() { String::new() } else { format!(":{}", suffix) }
        )
    }
}
