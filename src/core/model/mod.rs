//! Documentation objects: the uniform model built from program objects and
//! documentation trees.

mod class;
mod function;
mod module;
mod namespace;
mod variable;

pub use class::Class;
pub use function::Function;
pub use module::Module;
pub use namespace::{Namespace, NamespaceState};
pub use variable::{DefaultValue, Variable};

use once_cell::unsync::OnceCell;
use std::fmt;
use std::rc::Rc;

/// `(modulename, qualname)` of a declaration site
pub type Location = (String, String);

/// Identity shared by every documentation object
#[derive(Debug, Clone)]
pub struct DocBase {
    pub modulename: String,
    pub qualname: String,
    /// Where the object was originally declared
    pub taken_from: Location,
    fullname: OnceCell<String>,
}

impl DocBase {
    pub fn new(modulename: impl Into<String>, qualname: impl Into<String>, taken_from: Location) -> Self {
        Self {
            modulename: modulename.into(),
            qualname: qualname.into(),
            taken_from,
            fullname: OnceCell::new(),
        }
    }

    /// `modulename.qualname`; modules have an empty qualname
    pub fn fullname(&self) -> &str {
        self.fullname.get_or_init(|| {
            format!("{}.{}", self.modulename, self.qualname)
                .trim_matches('.')
                .to_string()
        })
    }

    pub fn name(&self) -> &str {
        let fullname = self.fullname();
        fullname.rsplit('.').next().unwrap_or(fullname)
    }

    pub fn location(&self) -> Location {
        (self.modulename.clone(), self.qualname.clone())
    }

    /// Inherited from a base class or re-exported from another module
    pub fn is_inherited(&self) -> bool {
        self.modulename != self.taken_from.0 || self.qualname != self.taken_from.1
    }

    fn same_identity(&self, other: &DocBase) -> bool {
        self.modulename == other.modulename && self.qualname == other.qualname && self.taken_from == other.taken_from
    }
}

/// One documented program entity
#[derive(Debug, Clone)]
pub enum Doc {
    Module(Rc<Module>),
    Class(Rc<Class>),
    Function(Rc<Function>),
    Variable(Rc<Variable>),
}

impl Doc {
    pub fn base(&self) -> &DocBase {
        match self {
            Doc::Module(m) => m.base(),
            Doc::Class(c) => c.base(),
            Doc::Function(f) => f.base(),
            Doc::Variable(v) => v.base(),
        }
    }

    /// `"module"`, `"class"`, `"function"` or `"variable"`
    pub fn kind(&self) -> &'static str {
        match self {
            Doc::Module(_) => "module",
            Doc::Class(_) => "class",
            Doc::Function(_) => "function",
            Doc::Variable(_) => "variable",
        }
    }

    pub fn modulename(&self) -> &str {
        &self.base().modulename
    }

    pub fn qualname(&self) -> &str {
        &self.base().qualname
    }

    pub fn fullname(&self) -> &str {
        self.base().fullname()
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn taken_from(&self) -> &Location {
        &self.base().taken_from
    }

    pub fn is_inherited(&self) -> bool {
        self.base().is_inherited()
    }

    /// The cleaned docstring, empty when there is none
    pub fn docstring(&self) -> &str {
        match self {
            Doc::Module(m) => m.docstring(),
            Doc::Class(c) => c.docstring(),
            Doc::Function(f) => f.docstring(),
            Doc::Variable(v) => v.docstring(),
        }
    }

    /// Replace the docstring of a freshly built object
    pub(crate) fn with_docstring(self, docstring: String) -> Self {
        match self {
            Doc::Module(mut m) => {
                if let Some(inner) = Rc::get_mut(&mut m) {
                    inner.set_docstring(docstring);
                }
                Doc::Module(m)
            }
            Doc::Class(mut c) => {
                if let Some(inner) = Rc::get_mut(&mut c) {
                    inner.set_docstring(docstring);
                }
                Doc::Class(c)
            }
            Doc::Function(mut f) => {
                if let Some(inner) = Rc::get_mut(&mut f) {
                    inner.set_docstring(docstring);
                }
                Doc::Function(f)
            }
            Doc::Variable(mut v) => {
                if let Some(inner) = Rc::get_mut(&mut v) {
                    inner.set_docstring(docstring);
                }
                Doc::Variable(v)
            }
        }
    }

    pub fn as_module(&self) -> Option<&Rc<Module>> {
        match self {
            Doc::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Rc<Class>> {
        match self {
            Doc::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Doc::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Rc<Variable>> {
        match self {
            Doc::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Doc {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Doc::Module(a), Doc::Module(b)) => a == b,
            (Doc::Class(a), Doc::Class(b)) => a == b,
            (Doc::Function(a), Doc::Function(b)) => a == b,
            (Doc::Variable(a), Doc::Variable(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Doc::Module(m) => fmt::Display::fmt(m, f),
            Doc::Class(c) => fmt::Display::fmt(c, f),
            Doc::Function(func) => fmt::Display::fmt(func, f),
            Doc::Variable(v) => fmt::Display::fmt(v, f),
        }
    }
}

impl From<Module> for Doc {
    fn from(module: Module) -> Self {
        Doc::Module(Rc::new(module))
    }
}

impl From<Class> for Doc {
    fn from(class: Class) -> Self {
        Doc::Class(Rc::new(class))
    }
}

impl From<Function> for Doc {
    fn from(function: Function) -> Self {
        Doc::Function(Rc::new(function))
    }
}

impl From<Variable> for Doc {
    fn from(variable: Variable) -> Self {
        Doc::Variable(Rc::new(variable))
    }
}

fn cut(text: &str) -> String {
    if text.chars().count() < 20 {
        text.to_string()
    } else {
        let head: String = text.chars().take(20).collect();
        format!("{}…", head)
    }
}

/// The `  # inherited from …, doc…` suffix of the debug tree
fn doc_suffix(base: &DocBase, docstring: &str) -> String {
    let mut parts = Vec::new();
    if base.is_inherited() {
        let origin = format!("{}.{}", base.taken_from.0, base.taken_from.1);
        parts.push(format!("inherited from {}", origin.trim_end_matches('.')));
    }
    if !docstring.is_empty() {
        parts.push(cut(docstring));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("  # {}", parts.join(", "))
    }
}

fn decorator_prefix(decorators: &[String]) -> String {
    if decorators.is_empty() {
        String::new()
    } else {
        format!("{} ", decorators.join(" "))
    }
}

/// Public members, one per line and indented below their parent
fn children<N: Namespace + ?Sized>(namespace: &N) -> String {
    let rendered: Vec<String> = namespace
        .members()
        .values()
        .filter(|doc| !doc.name().starts_with('_') || doc.name() == "__init__")
        .map(|doc| doc.to_string())
        .collect();
    if rendered.is_empty() {
        return String::new();
    }
    let indented: Vec<String> = rendered
        .join("\n")
        .lines()
        .map(|line| if line.trim().is_empty() { line.to_string() } else { format!("    {}", line) })
        .collect();
    format!("\n{}", indented.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullname_and_name() {
        let module = DocBase::new("pkg.mod", "", ("pkg.mod".to_string(), String::new()));
        assert_eq!(module.fullname(), "pkg.mod");
        assert_eq!(module.name(), "mod");
        assert!(!module.is_inherited());

        let title = DocBase::new("", "Guide", (String::new(), String::new()));
        assert_eq!(title.fullname(), "Guide");

        let member = DocBase::new("m", "B.attr", ("m".to_string(), "A.attr".to_string()));
        assert_eq!(member.name(), "attr");
        assert!(member.is_inherited());
    }

    #[test]
    fn test_doc_suffix() {
        let own = DocBase::new("m", "f", ("m".to_string(), "f".to_string()));
        assert_eq!(doc_suffix(&own, ""), "");
        assert_eq!(doc_suffix(&own, "short"), "  # short");
        assert_eq!(
            doc_suffix(&own, "a docstring longer than twenty characters"),
            "  # a docstring longer t…"
        );

        let inherited = DocBase::new("m", "B.f", ("m".to_string(), "A.f".to_string()));
        assert_eq!(doc_suffix(&inherited, "doc"), "  # inherited from m.A.f, doc");
    }
}
