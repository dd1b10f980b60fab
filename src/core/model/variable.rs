use once_cell::unsync::OnceCell;
use std::fmt;

use super::{doc_suffix, DocBase, Location};
use crate::core::annotations::Annotation;
use crate::core::inspect::{cleandoc, try_repr};
use crate::core::program::PyRef;

/// The value a variable is bound to
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DefaultValue {
    /// No value is known, e.g. for annotation-only declarations
    #[default]
    Empty,
    Value(PyRef),
}

impl DefaultValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_value(&self) -> Option<&PyRef> {
        match self {
            Self::Empty => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl From<PyRef> for DefaultValue {
    fn from(value: PyRef) -> Self {
        Self::Value(value)
    }
}

impl From<Option<PyRef>> for DefaultValue {
    fn from(value: Option<PyRef>) -> Self {
        value.map_or(Self::Empty, Self::Value)
    }
}

/// A module, class or instance variable.
///
/// Variables cannot introspect themselves, so their docstring, annotation and
/// default value are handed over by whoever builds them.
#[derive(Debug)]
pub struct Variable {
    base: DocBase,
    docstring: String,
    pub annotation: Annotation,
    pub default_value: DefaultValue,
    pub is_const: bool,
    default_value_str: OnceCell<String>,
}

impl Variable {
    pub fn new(modulename: impl Into<String>, qualname: impl Into<String>, taken_from: Location) -> Self {
        Self {
            base: DocBase::new(modulename, qualname, taken_from),
            docstring: String::new(),
            annotation: Annotation::Empty,
            default_value: DefaultValue::Empty,
            is_const: true,
            default_value_str: OnceCell::new(),
        }
    }

    pub fn with_docstring(mut self, docstring: &str) -> Self {
        self.set_docstring(docstring.to_string());
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<Annotation>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn with_default(mut self, default_value: impl Into<DefaultValue>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn constant(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    pub fn base(&self) -> &DocBase {
        &self.base
    }

    pub(crate) fn set_docstring(&mut self, docstring: String) {
        self.docstring = cleandoc(&docstring);
    }

    pub fn docstring(&self) -> &str {
        &self.docstring
    }

    /// Annotated with `ClassVar[...]`
    pub fn is_classvar(&self) -> bool {
        self.annotation.as_type().is_some_and(|expr| expr.is_classvar())
    }

    /// ` = repr(value)`, or an empty string when no value is known
    pub fn default_value_str(&self) -> &str {
        self.default_value_str.get_or_init(|| match &self.default_value {
            DefaultValue::Empty => String::new(),
            DefaultValue::Value(value) => match try_repr(value) {
                Some(repr) => format!(" = {}", repr),
                None => " = <unable to get value representation>".to_string(),
            },
        })
    }

    /// `: annotation`, or an empty string when there is none
    pub fn annotation_str(&self) -> String {
        self.annotation
            .format(None)
            .map(|text| format!(": {}", text))
            .unwrap_or_default()
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.base.same_identity(&other.base) && self.default_value == other.default_value
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<var {}{}{}{}>",
            self.base.name(),
            self.annotation_str(),
            self.default_value_str(),
            doc_suffix(&self.base, &self.docstring)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::TypeExpr;
    use crate::core::program::Program;

    fn location(module: &str, qualname: &str) -> Location {
        (module.to_string(), qualname.to_string())
    }

    #[test]
    fn test_annotation_without_default() {
        let program = Program::empty();
        let int = PyRef::new(program.clone(), program.builtins().int);
        let var = Variable::new("m", "count", location("m", "count"))
            .with_docstring("  How many.\n")
            .with_annotation(TypeExpr::Object(int));

        assert_eq!(var.default_value_str(), "");
        assert_eq!(var.annotation_str(), ": int");
        assert_eq!(var.docstring(), "How many.");
        assert!(!var.is_classvar());
        assert_eq!(var.to_string(), "<var count: int  # How many.>");
    }

    #[test]
    fn test_default_without_annotation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.py"), "limit = 10\nclass Opaque:\n    def __repr__(self): ...\nthing = Opaque()\n")
            .unwrap();
        let program = Program::load(&crate::core::program::LoadOptions::new([dir.path()])).unwrap();
        let module = PyRef::new(program.clone(), program.module_id("m").unwrap());
        let limit = crate::core::inspect::safe_getattr(&module, "limit");

        let var = Variable::new("m", "limit", location("m", "limit")).with_default(limit);
        assert_eq!(var.default_value_str(), " = 10");
        assert_eq!(var.annotation_str(), "");

        let thing = crate::core::inspect::safe_getattr(&module, "thing");
        let var = Variable::new("m", "thing", location("m", "thing")).with_default(thing);
        assert_eq!(var.default_value_str(), " = <unable to get value representation>");
    }

    #[test]
    fn test_equality_uses_default_identity() {
        let program = Program::empty();
        let int = PyRef::new(program.clone(), program.builtins().int);
        let a = Variable::new("m", "x", location("m", "x")).with_default(Some(int.clone()));
        let b = Variable::new("m", "x", location("m", "x")).with_default(int.clone());
        let c = Variable::new("m", "x", location("m", "x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(b.default_value.as_value(), Some(&int));
    }
}
