//! The loaded program: an arena of module, class, function and value objects
//! produced by executing the declaration-level statements of Python sources.

mod builtins;
mod loader;
mod mro;
mod source;

pub use builtins::{Builtins, DICT_DOC, OBJECT_INIT_DOC, OBJECT_NEW_DOC, TYPE_CALL_DOC};
pub use loader::{LoadOptions, Loader};
pub use source::{SourceEncoding, SourceFile};

use indexmap::IndexMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::rc::Rc;

use crate::error::{DocprobeError, Result};

/// Index of an object inside its program's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

/// Where an object's declaration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Declared in a loaded source file
    Source,
    /// Part of the modelled standard library
    Builtin,
    /// Placeholder for something outside the loaded sources
    Foreign,
}

#[derive(Debug, Clone)]
pub struct ModuleObject {
    pub name: String,
    pub doc: Option<String>,
    pub dict: IndexMap<String, ObjectId>,
    pub annotations: IndexMap<String, String>,
    /// Search path of a package, `None` for plain modules
    pub package_dir: Option<PathBuf>,
    pub source: Option<Rc<SourceFile>>,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct ClassObject {
    pub name: String,
    pub qualname: String,
    pub module: String,
    pub doc: Option<String>,
    pub bases: Vec<ObjectId>,
    /// Bases as written when at least one of them was subscripted
    pub orig_bases: Option<Vec<ObjectId>>,
    pub metaclass: Option<ObjectId>,
    /// Method resolution order, starting with the class itself
    pub mro: Vec<ObjectId>,
    pub dict: IndexMap<String, ObjectId>,
    pub annotations: IndexMap<String, String>,
    pub decorators: Vec<String>,
    /// What `cls.__dict__` evaluates to
    pub namespace: Option<ObjectId>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

/// A parameter as written in a `def` statement
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<String>,
    pub default: Option<String>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            annotation: None,
            default: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionObject {
    pub name: String,
    pub qualname: String,
    pub module: String,
    pub doc: Option<String>,
    pub parameters: Vec<ParamDecl>,
    pub returns: Option<String>,
    pub is_async: bool,
    pub decorators: Vec<String>,
    pub is_abstract: bool,
}

/// Callables implemented outside Python source, e.g. `object.__init__`
#[derive(Debug, Clone)]
pub struct BuiltinCallable {
    pub name: String,
    pub qualname: String,
    pub module: String,
    pub doc: Option<String>,
    pub parameters: Option<Vec<ParamDecl>>,
}

#[derive(Debug, Clone)]
pub struct PropertyObject {
    pub fget: Option<ObjectId>,
    pub doc: Option<String>,
    pub is_abstract: bool,
}

/// Slot storage created by `__slots__`, `__dict__` and `__weakref__`
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub owner: String,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenericAlias {
    pub origin: ObjectId,
    /// `repr()` of the subscripted alias, e.g. `typing.Generic[~T]`
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Str(String),
    StrList(Vec<String>),
    Literal,
    Instance,
    Expression,
    /// The read-only view of a class namespace
    Namespace(ObjectId),
}

#[derive(Debug, Clone)]
pub struct ValueObject {
    pub class: Option<ObjectId>,
    /// `None` when the value has no static representation
    pub repr: Option<String>,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub enum PyObject {
    Module(ModuleObject),
    Class(ClassObject),
    Function(FunctionObject),
    ClassMethod(ObjectId),
    StaticMethod(ObjectId),
    Property(PropertyObject),
    CachedProperty(ObjectId),
    MemberDescriptor(MemberDescriptor),
    Builtin(BuiltinCallable),
    /// `typing` constructs such as `ClassVar` and `Optional`
    SpecialForm { name: String, runtime: Option<ObjectId> },
    TypeVar { name: String, module: String },
    GenericAlias(GenericAlias),
    Value(ValueObject),
    Foreign { module: String, qualname: String },
}

impl PyObject {
    pub fn as_module(&self) -> Option<&ModuleObject> {
        match self {
            Self::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassObject> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionObject> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Arena {
    objects: Vec<PyObject>,
    modules: IndexMap<String, ObjectId>,
}

impl Arena {
    pub(crate) fn alloc(&mut self, object: PyObject) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub(crate) fn get(&self, id: ObjectId) -> &PyObject {
        &self.objects[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> &mut PyObject {
        &mut self.objects[id.0]
    }

    pub(crate) fn class(&self, id: ObjectId) -> Option<&ClassObject> {
        self.get(id).as_class()
    }

    pub(crate) fn class_mut(&mut self, id: ObjectId) -> Option<&mut ClassObject> {
        match self.get_mut(id) {
            PyObject::Class(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn module_mut(&mut self, id: ObjectId) -> Option<&mut ModuleObject> {
        match self.get_mut(id) {
            PyObject::Module(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn register_module(&mut self, module: ModuleObject) -> ObjectId {
        let name = module.name.clone();
        let id = self.alloc(PyObject::Module(module));
        self.modules.insert(name, id);
        id
    }

    pub(crate) fn module_id(&self, name: &str) -> Option<ObjectId> {
        self.modules.get(name).copied()
    }

    /// The linearization of a class, or the object alone for non-classes
    pub(crate) fn mro_of(&self, id: ObjectId) -> Vec<ObjectId> {
        match self.class(id) {
            Some(class) => class.mro.clone(),
            None => vec![id],
        }
    }

    pub(crate) fn is_subclass(&self, class: ObjectId, base: ObjectId) -> bool {
        self.class(class).is_some_and(|c| c.mro.contains(&base))
    }
}

/// Every object reachable from the loaded source roots
#[derive(Debug)]
pub struct Program {
    arena: Arena,
    failed: IndexMap<String, String>,
    builtins: Builtins,
}

impl Program {
    /// Discover and load every module under the configured source roots
    pub fn load(options: &LoadOptions) -> Result<Rc<Program>> {
        Ok(Rc::new(Loader::new(options.clone())?.run()?))
    }

    /// A program that only knows the modelled standard library
    pub fn empty() -> Rc<Program> {
        Rc::new(Loader::builtins_only().finish())
    }

    pub(crate) fn from_parts(arena: Arena, failed: IndexMap<String, String>, builtins: Builtins) -> Self {
        Self {
            arena,
            failed,
            builtins,
        }
    }

    pub fn object(&self, id: ObjectId) -> &PyObject {
        self.arena.get(id)
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn module_id(&self, name: &str) -> Option<ObjectId> {
        self.arena.module_id(name)
    }

    /// Look a module up by its dotted name, the analogue of `importlib.import_module`
    pub fn import_module(&self, name: &str) -> Result<ObjectId> {
        if let Some(id) = self.arena.module_id(name) {
            return Ok(id);
        }
        let reason = self
            .failed
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("No module named '{}'", name));
        Err(DocprobeError::Import {
            name: name.to_string(),
            reason,
        })
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.arena.modules.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Modules that were discovered but could not be loaded, with the reason
    pub fn failed_imports(&self) -> &IndexMap<String, String> {
        &self.failed
    }

    pub fn class(&self, id: ObjectId) -> Option<&ClassObject> {
        self.arena.class(id)
    }

    pub fn module(&self, id: ObjectId) -> Option<&ModuleObject> {
        self.object(id).as_module()
    }

    pub fn is_subclass(&self, class: ObjectId, base: ObjectId) -> bool {
        self.arena.is_subclass(class, base)
    }

    /// Names of the modules and packages found directly inside a package
    /// directory, sorted like `pkgutil.iter_modules`.
    pub fn child_module_names(&self, package: ObjectId) -> Vec<String> {
        let Some(dir) = self.module(package).and_then(|m| m.package_dir.as_ref()) else {
            return Vec::new();
        };

        let mut names: Vec<String> = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let file_name = path.file_name()?.to_str()?;
                if entry.file_type().is_dir() {
                    if path.join("__init__.py").is_file() && is_identifier(file_name) {
                        return Some(file_name.to_string());
                    }
                    return None;
                }
                let stem = file_name.strip_suffix(".py")?;
                if stem == "__init__" || !is_identifier(stem) {
                    return None;
                }
                Some(stem.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => chars.all(|c| c == '_' || c.is_alphanumeric()),
        _ => false,
    }
}

/// A handle to one program object; equality is object identity
#[derive(Clone)]
pub struct PyRef {
    program: Rc<Program>,
    id: ObjectId,
}

impl PyRef {
    pub fn new(program: Rc<Program>, id: ObjectId) -> Self {
        Self { program, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn object(&self) -> &PyObject {
        self.program.object(self.id)
    }

    /// Another object of the same program
    pub fn sibling(&self, id: ObjectId) -> PyRef {
        PyRef::new(self.program.clone(), id)
    }
}

impl PartialEq for PyRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.program, &other.program)
    }
}

impl Eq for PyRef {}

impl Hash for PyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        (Rc::as_ptr(&self.program) as usize).hash(state);
    }
}

impl fmt::Debug for PyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PyRef({}, {})", self.id.0, crate::core::inspect::object_repr(self))
    }
}
