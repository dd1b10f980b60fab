//! Introspection primitives answered from the loaded program.
//!
//! Attribute access and docstring lookup never fail: absent attributes come
//! back as `None` and absent docstrings as an empty string.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::program::{ObjectId, Origin, PyObject, PyRef, ValueKind, ValueObject};

static ADDRESS_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r" at 0x[0-9a-fA-F]+>").ok());

/// Drop memory addresses from reprs like `<object at 0x7f...>`
pub fn strip_addresses(repr: &str) -> String {
    match ADDRESS_SUFFIX.as_ref() {
        Some(re) => re.replace_all(repr, ">").into_owned(),
        None => repr.to_string(),
    }
}

/// Clean up indentation of a docstring the way `inspect.cleandoc` does
pub fn cleandoc(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let margin = lines[1..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_width(line))
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim_start().to_string());
    for line in &lines[1..] {
        let cut = margin.min(indent_width(line));
        let start = line.char_indices().nth(cut).map_or(line.len(), |(i, _)| i);
        cleaned.push(line[start..].trim_end_matches(['\r']).to_string());
    }

    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    let leading = cleaned.iter().take_while(|l| l.trim().is_empty()).count();
    cleaned[leading..].join("\n")
}

/// Leading whitespace of a line, in characters
fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Attribute lookup that never raises
pub fn safe_getattr(obj: &PyRef, name: &str) -> Option<PyRef> {
    let program = obj.program();
    match obj.object() {
        PyObject::Module(module) => module.dict.get(name).map(|id| obj.sibling(*id)),
        PyObject::Class(class) => {
            if name == "__dict__" {
                if let Some(namespace) = class.namespace {
                    return Some(obj.sibling(namespace));
                }
            }
            if let Some(found) = lookup_in_mro(obj, &class.mro, name) {
                return Some(found);
            }
            let meta_mro = class.metaclass.map(|m| program.class(m).map(|c| c.mro.clone()).unwrap_or_default())?;
            lookup_in_mro(obj, &meta_mro, name)
        }
        PyObject::Property(property) if name == "fget" => property.fget.map(|id| obj.sibling(id)),
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) | PyObject::CachedProperty(inner)
            if name == "__func__" || name == "func" =>
        {
            Some(obj.sibling(*inner))
        }
        PyObject::Value(ValueObject {
            class: Some(class),
            kind: ValueKind::Instance,
            ..
        }) => safe_getattr(&obj.sibling(*class), name),
        _ => None,
    }
}

/// What `getattr(cls, name)` yields for a value found in a class dict
fn lookup_in_mro(obj: &PyRef, mro: &[ObjectId], name: &str) -> Option<PyRef> {
    let program = obj.program();
    let id = mro
        .iter()
        .find_map(|class| program.class(*class).and_then(|c| c.dict.get(name)).copied())?;
    Some(obj.sibling(unwrap_method(obj, id)))
}

fn unwrap_method(obj: &PyRef, id: ObjectId) -> ObjectId {
    match obj.program().object(id) {
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => *inner,
        _ => id,
    }
}

/// The raw `__doc__` of an object
pub fn raw_doc(obj: &PyRef) -> Option<String> {
    match obj.object() {
        PyObject::Module(module) => module.doc.clone(),
        PyObject::Class(class) => match class.dict.get("__doc__").map(|id| obj.program().object(*id)) {
            Some(PyObject::Value(ValueObject {
                kind: ValueKind::Str(doc),
                ..
            })) => Some(doc.clone()),
            Some(_) => None,
            None => class.doc.clone(),
        },
        PyObject::Function(function) => function.doc.clone(),
        PyObject::Builtin(builtin) => builtin.doc.clone(),
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) | PyObject::CachedProperty(inner) => {
            raw_doc(&obj.sibling(*inner))
        }
        PyObject::Property(property) => property
            .doc
            .clone()
            .or_else(|| property.fget.and_then(|f| raw_doc(&obj.sibling(f)))),
        PyObject::MemberDescriptor(descriptor) => descriptor.doc.clone(),
        PyObject::GenericAlias(alias) => raw_doc(&obj.sibling(alias.origin)),
        PyObject::Value(ValueObject { class: Some(class), .. }) => raw_doc(&obj.sibling(*class)),
        _ => None,
    }
}

/// Docstring lookup that never raises; inherited docstrings are found the way
/// `inspect.getdoc` finds them
pub fn safe_getdoc(obj: &PyRef) -> String {
    raw_doc(obj)
        .or_else(|| find_inherited_doc(obj))
        .map(|doc| cleandoc(&doc))
        .unwrap_or_default()
}

fn find_inherited_doc(obj: &PyRef) -> Option<String> {
    let program = obj.program();
    match obj.object() {
        PyObject::Class(class) => class
            .mro
            .iter()
            .filter(|base| **base != program.builtins().object)
            .find_map(|base| raw_doc(&obj.sibling(*base))),
        PyObject::Function(_) | PyObject::Builtin(_) => {
            let (name, class) = defining_class(obj)?;
            let found = safe_getattr(&class, &name)?;
            if found != *obj {
                return None;
            }
            doc_in_mro(&class, &name)
        }
        PyObject::Property(property) => {
            let getter = obj.sibling(property.fget?);
            let (name, class) = defining_class(&getter)?;
            doc_in_mro(&class, &name)
        }
        _ => None,
    }
}

fn doc_in_mro(class: &PyRef, name: &str) -> Option<String> {
    let mro = class.object().as_class()?.mro.clone();
    mro.iter().find_map(|base| {
        let value = safe_getattr(&class.sibling(*base), name)?;
        raw_doc(&value)
    })
}

/// The class a function's qualified name places it in, with the function's name
pub fn defining_class(function: &PyRef) -> Option<(String, PyRef)> {
    let module = object_module(function)?;
    let qualname = object_qualname(function)?;
    let (path, name) = qualname.rsplit_once('.')?;

    let program = function.program();
    let mut current = function.sibling(program.module_id(&module)?);
    for part in path.split('.') {
        current = safe_getattr(&current, part)?;
    }
    current.object().as_class()?;
    Some((name.to_string(), current))
}

/// `__all__` of a module; `None` when absent or not a sequence of strings
pub fn get_all(module: &PyRef) -> Option<Vec<String>> {
    let value = safe_getattr(module, "__all__")?;
    match value.object() {
        PyObject::Value(ValueObject {
            kind: ValueKind::StrList(names),
            ..
        }) => Some(names.clone()),
        _ => {
            warn!("Invalid __all__ in {}: {}", object_repr(module), object_repr(&value));
            None
        }
    }
}

/// Name of the module an object belongs to, `inspect.getmodule` style
pub fn get_module(obj: &PyRef) -> Option<String> {
    match obj.object() {
        PyObject::Module(module) => Some(module.name.clone()),
        _ => object_module(obj),
    }
}

pub fn is_package(obj: &PyRef) -> bool {
    obj.object().as_module().is_some_and(|m| m.package_dir.is_some())
}

pub fn is_module(obj: &PyRef) -> bool {
    matches!(obj.object(), PyObject::Module(_))
}

pub fn is_class(obj: &PyRef) -> bool {
    matches!(obj.object(), PyObject::Class(_))
}

pub fn is_subclass(class: &PyRef, base: ObjectId) -> bool {
    class.program().is_subclass(class.id(), base)
}

/// Classes whose metaclass derives from `ABCMeta` and that still carry abstract members
pub fn is_abstract(class: &PyRef) -> bool {
    let program = class.program();
    let Some(c) = class.object().as_class() else {
        return false;
    };
    let abc_meta = program.builtins().abc_meta;
    if !c.metaclass.is_some_and(|m| program.is_subclass(m, abc_meta)) {
        return false;
    }

    let mut seen = std::collections::HashSet::new();
    for base in &c.mro {
        let Some(base) = program.class(*base) else {
            continue;
        };
        for (name, value) in &base.dict {
            if seen.insert(name.as_str()) && is_abstract_member(class, *value) {
                return true;
            }
        }
    }
    false
}

fn is_abstract_member(obj: &PyRef, id: ObjectId) -> bool {
    match obj.program().object(id) {
        PyObject::Function(f) => f.is_abstract,
        PyObject::Property(p) => p.is_abstract,
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) | PyObject::CachedProperty(inner) => {
            is_abstract_member(obj, *inner)
        }
        _ => false,
    }
}

/// Slot wrappers, method descriptors and builtin functions
pub fn is_non_user_callable(obj: &PyRef) -> bool {
    matches!(obj.object(), PyObject::Builtin(_))
}

/// Functions and the method wrappers around them
pub fn is_routine(obj: &PyRef) -> bool {
    matches!(
        obj.object(),
        PyObject::Function(_) | PyObject::Builtin(_) | PyObject::ClassMethod(_) | PyObject::StaticMethod(_)
    )
}

/// Descriptors defining `__set__` or `__delete__` that are not properties
pub fn is_data_descriptor(obj: &PyRef) -> bool {
    matches!(obj.object(), PyObject::MemberDescriptor(_))
}

pub fn is_none(obj: &PyRef) -> bool {
    matches!(
        obj.object(),
        PyObject::Value(ValueObject {
            class: None,
            kind: ValueKind::Literal,
            repr: Some(repr),
        }) if repr == "None"
    )
}

/// `type(cls)` for classes
pub fn metaclass(class: &PyRef) -> Option<PyRef> {
    class.object().as_class()?.metaclass.map(|m| class.sibling(m))
}

/// Whether a documented name is expected to stay constant
pub fn is_constant(name: &str, objtype: &str) -> bool {
    objtype != "attribute" && !name.starts_with('_')
}

/// `__module__` of an object, if it has one
pub fn object_module(obj: &PyRef) -> Option<String> {
    let program = obj.program();
    match obj.object() {
        PyObject::Class(class) => Some(class.module.clone()),
        PyObject::Function(function) => Some(function.module.clone()),
        PyObject::Builtin(builtin) => Some(builtin.module.clone()),
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) | PyObject::CachedProperty(inner) => {
            object_module(&obj.sibling(*inner))
        }
        PyObject::TypeVar { module, .. } => Some(module.clone()),
        PyObject::SpecialForm { .. } => Some("typing".to_string()),
        PyObject::GenericAlias(alias) => object_module(&obj.sibling(alias.origin)),
        PyObject::Value(ValueObject { class: Some(class), .. })
            if program.class(*class).is_some_and(|c| c.origin == Origin::Source) =>
        {
            object_module(&obj.sibling(*class))
        }
        PyObject::Foreign { module, .. } => Some(module.clone()),
        _ => None,
    }
}

/// `__qualname__` of an object, if it has one
pub fn object_qualname(obj: &PyRef) -> Option<String> {
    match obj.object() {
        PyObject::Class(class) => Some(class.qualname.clone()),
        PyObject::Function(function) => Some(function.qualname.clone()),
        PyObject::Builtin(builtin) => Some(builtin.qualname.clone()),
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => object_qualname(&obj.sibling(*inner)),
        PyObject::Foreign { qualname, .. } => Some(qualname.clone()),
        _ => None,
    }
}

/// `__name__` of an object, if it has one
pub fn object_name(obj: &PyRef) -> Option<String> {
    match obj.object() {
        PyObject::Module(module) => Some(module.name.clone()),
        PyObject::Class(class) => Some(class.name.clone()),
        PyObject::Function(function) => Some(function.name.clone()),
        PyObject::Builtin(builtin) => Some(builtin.name.clone()),
        PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => object_name(&obj.sibling(*inner)),
        PyObject::TypeVar { name, .. } => Some(name.clone()),
        PyObject::SpecialForm { name, .. } => Some(name.clone()),
        _ => None,
    }
}

/// `repr(type(obj))`, used in error messages
pub fn type_name(obj: &PyRef) -> String {
    let program = obj.program();
    let name = match obj.object() {
        PyObject::Module(_) => "module".to_string(),
        PyObject::Class(class) => match class.metaclass.and_then(|m| program.class(m)) {
            Some(meta) => qualified(&meta.module, &meta.qualname),
            None => "type".to_string(),
        },
        PyObject::Function(_) => "function".to_string(),
        PyObject::ClassMethod(_) => "classmethod".to_string(),
        PyObject::StaticMethod(_) => "staticmethod".to_string(),
        PyObject::Property(_) => "property".to_string(),
        PyObject::CachedProperty(_) => "functools.cached_property".to_string(),
        PyObject::MemberDescriptor(_) => "member_descriptor".to_string(),
        PyObject::Builtin(_) => "builtin_function_or_method".to_string(),
        PyObject::SpecialForm { .. } => "typing._SpecialForm".to_string(),
        PyObject::TypeVar { .. } => "typing.TypeVar".to_string(),
        PyObject::GenericAlias(_) => "typing._GenericAlias".to_string(),
        PyObject::Value(ValueObject {
            kind: ValueKind::Namespace(_),
            ..
        }) => "mappingproxy".to_string(),
        PyObject::Value(value) => match value.class.and_then(|c| program.class(c)) {
            Some(class) => qualified(&class.module, &class.qualname),
            None if is_none(obj) => "NoneType".to_string(),
            None => "object".to_string(),
        },
        PyObject::Foreign { .. } => "object".to_string(),
    };
    format!("<class '{}'>", name)
}

fn qualified(module: &str, qualname: &str) -> String {
    if module == "builtins" {
        qualname.to_string()
    } else {
        format!("{}.{}", module, qualname)
    }
}

/// `repr()` of an object; unrepresentable values get a generic placeholder
pub fn object_repr(obj: &PyRef) -> String {
    try_repr(obj).unwrap_or_else(|| {
        let type_name = type_name(obj);
        let name = type_name.trim_start_matches("<class '").trim_end_matches("'>");
        format!("<{} object>", name)
    })
}

/// `repr()` of an object, `None` when it cannot be produced statically
pub fn try_repr(obj: &PyRef) -> Option<String> {
    let program = obj.program();
    let repr = match obj.object() {
        PyObject::Module(module) => match (&module.source, module.origin) {
            (Some(source), _) => format!("<module '{}' from '{}'>", module.name, source.path.display()),
            (None, Origin::Builtin) => format!("<module '{}' (built-in)>", module.name),
            (None, _) => format!("<module '{}'>", module.name),
        },
        PyObject::Class(class) => format!("<class '{}'>", qualified(&class.module, &class.qualname)),
        PyObject::Function(function) => format!("<function {}>", function.qualname),
        PyObject::ClassMethod(inner) => format!("<classmethod({})>", try_repr(&obj.sibling(*inner))?),
        PyObject::StaticMethod(inner) => format!("<staticmethod({})>", try_repr(&obj.sibling(*inner))?),
        PyObject::Property(_) => "<property object>".to_string(),
        PyObject::CachedProperty(_) => "<functools.cached_property object>".to_string(),
        PyObject::MemberDescriptor(descriptor) => {
            let kind = if matches!(descriptor.name.as_str(), "__dict__" | "__weakref__") { "attribute" } else { "member" };
            format!("<{} '{}' of '{}' objects>", kind, descriptor.name, descriptor.owner)
        }
        PyObject::Builtin(builtin) => match builtin.qualname.split_once('.') {
            Some((owner, name)) => format!("<slot wrapper '{}' of '{}' objects>", name, owner),
            None => format!("<built-in function {}>", builtin.name),
        },
        PyObject::SpecialForm { name, .. } => format!("typing.{}", name),
        PyObject::TypeVar { name, .. } => format!("~{}", name),
        PyObject::GenericAlias(alias) => alias.text.clone(),
        PyObject::Value(ValueObject {
            kind: ValueKind::Namespace(class),
            ..
        }) => {
            let class = program.class(*class)?;
            let mut entries = Vec::with_capacity(class.dict.len());
            for (name, value) in &class.dict {
                entries.push(format!(
                    "{}: {}",
                    super::syntax::python_str_repr(name),
                    try_repr(&obj.sibling(*value))?
                ));
            }
            format!("mappingproxy({{{}}})", entries.join(", "))
        }
        PyObject::Value(value) => value.repr.clone()?,
        PyObject::Foreign { module, qualname } => format!("<{}.{}>", module, qualname),
    };
    Some(strip_addresses(&repr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::program::{LoadOptions, Program};
    use std::fs;
    use std::rc::Rc;

    fn program(source: &str) -> (tempfile::TempDir, Rc<Program>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.py"), source).unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        (dir, program)
    }

    fn attr(program: &Rc<Program>, module: &str, path: &str) -> PyRef {
        let mut current = PyRef::new(program.clone(), program.module_id(module).unwrap());
        for part in path.split('.') {
            current = safe_getattr(&current, part).unwrap();
        }
        current
    }

    #[test]
    fn test_cleandoc() {
        assert_eq!(cleandoc("Summary.\n\n    Details\n      indented\n    "), "Summary.\n\nDetails\n  indented");
        assert_eq!(cleandoc("\n    first\n    second\n"), "first\nsecond");
        assert_eq!(cleandoc(""), "");
        assert_eq!(cleandoc("Summary\n x\n\u{a0}y"), "Summary\nx\ny");
        assert_eq!(cleandoc("Résumé.\n\n    Übersicht\n    \u{3000}café"), "Résumé.\n\nÜbersicht\n\u{3000}café");
    }

    #[test]
    fn test_getdoc_inherits_through_mro() {
        let (_dir, program) = program(
            r#"
class Base:
    """Base doc."""

    def run(self):
        """Run it."""

    def __init__(self):
        pass

class Child(Base):
    def run(self):
        pass
"#,
        );
        let child = attr(&program, "m", "Child");
        assert_eq!(safe_getdoc(&child), "Base doc.");
        assert_eq!(safe_getdoc(&attr(&program, "m", "Child.run")), "Run it.");
        // undocumented constructors fall back to object.__init__
        assert_eq!(
            safe_getdoc(&attr(&program, "m", "Child.__init__")),
            crate::core::program::OBJECT_INIT_DOC
        );
    }

    #[test]
    fn test_is_abstract() {
        let (_dir, program) = program(
            r#"
from abc import ABC, abstractmethod

class Shape(ABC):
    @abstractmethod
    def area(self): ...

class Square(Shape):
    def area(self):
        return 1

class Plain(ABC):
    pass
"#,
        );
        assert!(is_abstract(&attr(&program, "m", "Shape")));
        assert!(!is_abstract(&attr(&program, "m", "Square")));
        assert!(!is_abstract(&attr(&program, "m", "Plain")));
    }

    #[test]
    fn test_get_all_and_module_membership() {
        let (_dir, program) = program("import os\n__all__ = ['a', 'b']\nclass A:\n    pass\ninstance = A()\nx = 3\n");
        let module = PyRef::new(program.clone(), program.module_id("m").unwrap());
        assert_eq!(get_all(&module), Some(vec!["a".to_string(), "b".to_string()]));

        assert_eq!(get_module(&attr(&program, "m", "A")).as_deref(), Some("m"));
        assert_eq!(get_module(&attr(&program, "m", "instance")).as_deref(), Some("m"));
        assert_eq!(get_module(&attr(&program, "m", "x")), None);
        assert_eq!(get_module(&attr(&program, "m", "os")).as_deref(), Some("os"));
    }

    #[test]
    fn test_reprs() {
        let (_dir, program) = program(
            "class A:\n    def f(self): ...\n    def __repr__(self): ...\nclass B:\n    pass\na = A()\nb = B()\ns = \"it's\"\n",
        );
        assert_eq!(object_repr(&attr(&program, "m", "A")), "<class 'm.A'>");
        assert_eq!(object_repr(&attr(&program, "m", "A.f")), "<function A.f>");
        assert_eq!(try_repr(&attr(&program, "m", "a")), None);
        assert_eq!(try_repr(&attr(&program, "m", "b")).as_deref(), Some("<m.B object>"));
        assert_eq!(try_repr(&attr(&program, "m", "s")).as_deref(), Some("\"it's\""));
        assert_eq!(type_name(&attr(&program, "m", "s")), "<class 'str'>");
        assert!(try_repr(&attr(&program, "m", "B.__dict__")).unwrap().starts_with("mappingproxy({'__module__': 'm'"));
    }

    #[test]
    fn test_strip_addresses() {
        assert_eq!(strip_addresses("<Foo object at 0x7f3a2b>"), "<Foo object>");
        assert_eq!(strip_addresses("[<a at 0x1>, <b at 0xAB>]"), "[<a>, <b>]");
    }

    #[test]
    fn test_is_constant() {
        assert!(is_constant("MAX_SIZE", "data"));
        assert!(!is_constant("_private", "data"));
        assert!(!is_constant("value", "attribute"));
    }
}
