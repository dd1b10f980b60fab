//! Member resolution over the loaded program.
//!
//! Module and class resolvers walk the declaration tables of the program,
//! merge in what the variable scanner found in the source text, and record
//! where every member was originally declared.

use indexmap::{IndexMap, IndexSet};
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

use super::stubs::{PyiStubMerger, StubMerger};
use super::variable_scanner::VariableScanner;
use super::{Parser, ParserKey, ParserKind, ParserSuiteKind};
use crate::config::{Config, DuplicatePolicy, UnresolvedPolicy};
use crate::core::annotations::{self, Annotation, TypeExpr};
use crate::core::inspect::{
    get_all, get_module, is_abstract, is_class, is_data_descriptor, is_module, is_non_user_callable, is_package,
    is_routine, is_subclass, metaclass, object_module, object_qualname, raw_doc, safe_getattr, type_name,
};
use crate::core::model::{Class, DefaultValue, Doc, Function, Location, Module, Variable};
use crate::core::program::{
    ObjectId, Program, PyObject, PyRef, SourceEncoding, OBJECT_INIT_DOC, OBJECT_NEW_DOC, TYPE_CALL_DOC,
};
use crate::error::{DocprobeError, Result};

/// Attributes of a class that always come from the class itself
const FORCED_ATTRIBUTES: [&str; 5] = ["__init__", "__doc__", "__annotations__", "__dict__", "__module__"];

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCodeOptions {
    pub encoding: SourceEncoding,
    pub duplicate_comments: DuplicatePolicy,
    pub unresolved_all_entries: UnresolvedPolicy,
}

impl SourceCodeOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            encoding: SourceEncoding::from_label(&config.parsing.encoding)?,
            duplicate_comments: config.parsing.duplicate_comments,
            unresolved_all_entries: config.parsing.unresolved_all_entries,
        })
    }
}

/// Resolvers for modules and classes of one loaded program
pub struct SourceCodeParserSuite {
    program: Rc<Program>,
    options: SourceCodeOptions,
    scanners: RefCell<HashMap<String, Rc<VariableScanner>>>,
    stubs: Box<dyn StubMerger>,
}

impl fmt::Debug for SourceCodeParserSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCodeParserSuite")
            .field("options", &self.options)
            .field("scanners", &self.scanners.borrow().len())
            .field("stubs", &self.stubs)
            .finish()
    }
}

impl SourceCodeParserSuite {
    pub fn new(program: Rc<Program>, options: SourceCodeOptions) -> Rc<Self> {
        Self::with_stub_merger(program, options, Box::new(PyiStubMerger::new(options.encoding)))
    }

    pub fn with_stub_merger(program: Rc<Program>, options: SourceCodeOptions, stubs: Box<dyn StubMerger>) -> Rc<Self> {
        Rc::new(Self {
            program,
            options,
            scanners: RefCell::new(HashMap::new()),
            stubs,
        })
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn options(&self) -> &SourceCodeOptions {
        &self.options
    }

    /// `"module"` or `"class"`; anything else cannot be documented on its own
    pub fn obj_type(obj: &PyRef) -> Result<&'static str> {
        if is_module(obj) {
            Ok("module")
        } else if is_class(obj) {
            Ok("class")
        } else {
            Err(DocprobeError::UnsupportedObject(type_name(obj)))
        }
    }

    /// The resolver for a module or class
    pub fn parser_for(self: &Rc<Self>, obj: &PyRef) -> Result<Rc<dyn Parser>> {
        let kind = ParserSuiteKind::SourceCode.parser_type(Self::obj_type(obj)?);
        let parser: Rc<dyn Parser> = match kind {
            ParserKind::SourceCodeClass => Rc::new(SourceCodeClassParser::new(self.clone(), obj.clone())?),
            _ => Rc::new(SourceCodeModuleParser::new(self.clone(), obj.clone())?),
        };
        Ok(parser)
    }

    /// Document a top-level module or class
    pub fn document(self: &Rc<Self>, obj: &PyRef) -> Result<Doc> {
        match Self::obj_type(obj)? {
            "module" => Ok(Doc::Module(Rc::new(self.module_doc(obj)?))),
            _ => {
                let class = obj.object().as_class().ok_or_else(|| DocprobeError::UnsupportedObject(type_name(obj)))?;
                let location = (class.module.clone(), class.qualname.clone());
                Ok(Doc::from(Class::new(
                    class.module.clone(),
                    class.qualname.clone(),
                    Some(obj.clone()),
                    location,
                    Some(self.parser_for(obj)?),
                )))
            }
        }
    }

    /// Document a module by its dotted name
    pub fn module(self: &Rc<Self>, name: &str) -> Result<Rc<Module>> {
        let id = self.program.import_module(name)?;
        let obj = PyRef::new(self.program.clone(), id);
        Ok(Rc::new(self.module_doc(&obj)?))
    }

    fn module_doc(self: &Rc<Self>, obj: &PyRef) -> Result<Module> {
        let parser = SourceCodeModuleParser::new(self.clone(), obj.clone())?;
        let name = parser.modulename.clone();
        Ok(Module::new(
            name.clone(),
            "",
            Some(obj.clone()),
            (name, String::new()),
            Some(Rc::new(parser)),
        ))
    }

    /// The scanner over the source of a module; modules without source get
    /// an empty one. Scanners are shared between files with identical text.
    pub fn scanner(&self, module: &str) -> Rc<VariableScanner> {
        let source = self
            .program
            .module_id(module)
            .and_then(|id| self.program.module(id))
            .and_then(|m| m.source.clone());
        let key = match &source {
            Some(source) => source.content_hash.clone(),
            None => format!("<{}>", module),
        };
        if let Some(scanner) = self.scanners.borrow().get(&key) {
            debug!("Reusing cached scanner for {}", module);
            return scanner.clone();
        }

        let scanner = match source {
            Some(source) => VariableScanner::new(source.text.clone(), self.options.encoding)
                .with_origin(source.path.display().to_string()),
            None => VariableScanner::new("", self.options.encoding).with_origin(module),
        };
        let scanner = Rc::new(scanner.with_policy(self.options.duplicate_comments));
        self.scanners.borrow_mut().insert(key, scanner.clone());
        scanner
    }
}

/// The raw material a namespace's members are built from
pub trait MemberSource {
    fn suite(&self) -> &Rc<SourceCodeParserSuite>;

    /// Module or class the members belong to
    fn context(&self) -> &PyRef;

    fn modulename(&self) -> &str;

    /// `""` for modules
    fn qualname(&self) -> &str;

    /// Member names mapped to their values; `Empty` for declarations without one
    fn member_objects(&self) -> Result<IndexMap<String, DefaultValue>>;

    /// Scanned doc comments by variable name
    fn var_docstring(&self) -> Result<&IndexMap<String, String>>;

    /// Resolved variable annotations by name
    fn var_annotations(&self) -> Result<&IndexMap<String, TypeExpr>>;

    /// Where a member was originally declared
    fn taken_from(&self, name: &str, value: &DefaultValue) -> Result<Location>;

    /// Names that have a scanned doc comment or an annotation
    fn vars_sets(&self) -> Result<IndexSet<String>> {
        Ok(self
            .var_docstring()?
            .keys()
            .chain(self.var_annotations()?.keys())
            .cloned()
            .collect())
    }
}

/// Turn raw member values into documentation objects
pub fn compose_members<S: MemberSource + ?Sized>(source: &S) -> Result<IndexMap<String, Doc>> {
    let var_docstring = source.var_docstring()?;
    let var_annotations = source.var_annotations()?;
    let modulename = source.modulename();

    let mut members = IndexMap::new();
    for (name, value) in source.member_objects()? {
        let qualname = join_qualname(source.qualname(), &name);
        let taken_from = source.taken_from(&name, &value)?;
        let annotation = || {
            var_annotations
                .get(&name)
                .cloned()
                .map(Annotation::Type)
                .unwrap_or_default()
        };

        let doc: Doc = match &value {
            DefaultValue::Empty => Variable::new(modulename, &qualname, taken_from)
                .with_annotation(annotation())
                .into(),
            DefaultValue::Value(obj) => {
                if let Some(getter) = property_getter(obj) {
                    // the getter provides docstring and type of the property
                    let getter = Function::new(modulename, &qualname, getter, taken_from.clone());
                    Variable::new(modulename, &qualname, taken_from)
                        .with_docstring(getter.docstring())
                        .with_annotation(getter.signature().return_annotation.clone())
                        .into()
                } else if is_routine(obj) {
                    Function::new(modulename, &qualname, Some(obj.clone()), taken_from).into()
                } else if is_class(obj) {
                    let parser = SourceCodeClassParser::new(source.suite().clone(), obj.clone())?;
                    Class::new(modulename, &qualname, Some(obj.clone()), taken_from, Some(Rc::new(parser))).into()
                } else if is_module(obj) {
                    source.suite().module_doc(obj)?.into()
                } else if is_data_descriptor(obj) {
                    Variable::new(modulename, &qualname, taken_from)
                        .with_docstring(&raw_doc(obj).unwrap_or_default())
                        .with_annotation(annotation())
                        .into()
                } else {
                    Variable::new(modulename, &qualname, taken_from)
                        .with_annotation(annotation())
                        .with_default(obj.clone())
                        .into()
                }
            }
        };

        let doc = match var_docstring.get(&name) {
            Some(docstring) if !docstring.is_empty() => doc.with_docstring(docstring.clone()),
            _ => doc,
        };
        members.insert(name, doc);
    }
    Ok(members)
}

/// The getter of a property or cached property, possibly wrapped in a classmethod
fn property_getter(obj: &PyRef) -> Option<Option<PyRef>> {
    match obj.object() {
        PyObject::Property(property) => Some(property.fget.map(|f| obj.sibling(f))),
        PyObject::CachedProperty(func) => Some(Some(obj.sibling(*func))),
        PyObject::ClassMethod(inner) => match obj.program().object(*inner) {
            PyObject::Property(_) | PyObject::CachedProperty(_) => property_getter(&obj.sibling(*inner)),
            _ => None,
        },
        _ => None,
    }
}

fn join_qualname(parent: &str, name: &str) -> String {
    format!("{}.{}", parent, name).trim_start_matches('.').to_string()
}

/// Resolves the members of a module
pub struct SourceCodeModuleParser {
    suite: Rc<SourceCodeParserSuite>,
    obj: PyRef,
    modulename: String,
    scanner: Rc<VariableScanner>,
    var_docstring: OnceCell<IndexMap<String, String>>,
    var_annotations: OnceCell<IndexMap<String, TypeExpr>>,
}

impl fmt::Debug for SourceCodeModuleParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCodeModuleParser").field("module", &self.modulename).finish()
    }
}

impl SourceCodeModuleParser {
    pub fn new(suite: Rc<SourceCodeParserSuite>, obj: PyRef) -> Result<Self> {
        let modulename = obj
            .object()
            .as_module()
            .map(|m| m.name.clone())
            .ok_or_else(|| DocprobeError::UnsupportedObject(type_name(&obj)))?;
        let scanner = suite.scanner(&modulename);
        Ok(Self {
            suite,
            obj,
            modulename,
            scanner,
            var_docstring: OnceCell::new(),
            var_annotations: OnceCell::new(),
        })
    }

    fn program(&self) -> &Rc<Program> {
        self.obj.program()
    }

    /// The value of an `__all__` entry missing from the module dict
    fn import_all_entry(&self, name: &str) -> Option<PyRef> {
        let program = self.program();
        let child = format!("{}.{}", self.modulename, name);
        match program.import_module(&child).or_else(|_| program.import_module(name)) {
            Ok(id) => Some(self.obj.sibling(id)),
            Err(e) => {
                warn!("Found {:?} in {}.__all__, but it does not resolve: {}", name, self.modulename, e);
                None
            }
        }
    }
}

impl MemberSource for SourceCodeModuleParser {
    fn suite(&self) -> &Rc<SourceCodeParserSuite> {
        &self.suite
    }

    fn context(&self) -> &PyRef {
        &self.obj
    }

    fn modulename(&self) -> &str {
        &self.modulename
    }

    fn qualname(&self) -> &str {
        ""
    }

    fn member_objects(&self) -> Result<IndexMap<String, DefaultValue>> {
        let Some(module) = self.obj.object().as_module() else {
            return Ok(IndexMap::new());
        };
        let mut members = IndexMap::new();

        if let Some(all) = get_all(&self.obj) {
            for name in all {
                let value = if let Some(id) = module.dict.get(&name) {
                    DefaultValue::Value(self.obj.sibling(*id))
                } else if self.var_annotations()?.contains_key(&name) {
                    DefaultValue::Empty
                } else {
                    match self.import_all_entry(&name) {
                        Some(value) => DefaultValue::Value(value),
                        None if self.suite.options.unresolved_all_entries == UnresolvedPolicy::Skip => continue,
                        None => DefaultValue::Empty,
                    }
                };
                members.insert(name, value);
            }
            return Ok(members);
        }

        let vars = self.vars_sets()?;
        for (name, id) in &module.dict {
            let value = self.obj.sibling(*id);
            let declared_here = get_module(&value).as_deref() == Some(self.modulename.as_str());
            let is_type_var = matches!(value.object(), PyObject::TypeVar { .. });
            let is_child_module = value
                .object()
                .as_module()
                .is_some_and(|m| m.name == join_qualname(&self.modulename, name));
            if vars.contains(name) || (declared_here && !is_type_var) || is_child_module {
                members.insert(name.clone(), DefaultValue::Value(value));
            }
        }
        for name in vars {
            members.entry(name).or_insert(DefaultValue::Empty);
        }
        Ok(members)
    }

    fn var_docstring(&self) -> Result<&IndexMap<String, String>> {
        self.var_docstring
            .get_or_try_init(|| self.scanner.docstrings_in_namespace(""))
    }

    fn var_annotations(&self) -> Result<&IndexMap<String, TypeExpr>> {
        self.var_annotations.get_or_try_init(|| {
            let mut annotations = self.scanner.annotations_in_namespace("")?;
            if let Some(module) = self.obj.object().as_module() {
                annotations.extend(module.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Ok(annotations::resolve_all(&annotations, &self.obj, &self.modulename))
        })
    }

    fn taken_from(&self, name: &str, value: &DefaultValue) -> Result<Location> {
        let DefaultValue::Value(obj) = value else {
            return Ok((self.modulename.clone(), name.to_string()));
        };
        if let Some(module) = obj.object().as_module() {
            return Ok((module.name.clone(), String::new()));
        }
        let module = object_module(obj);
        let qualname = object_qualname(obj);
        Ok(match (module, qualname) {
            (Some(module), Some(qualname)) if !qualname.contains("<locals>") => (module, qualname),
            (module, _) => (module.unwrap_or_else(|| self.modulename.clone()), name.to_string()),
        })
    }
}

impl Parser for SourceCodeModuleParser {
    fn members(&self) -> Result<IndexMap<String, Doc>> {
        debug!("Resolving members of module {}", self.modulename);
        let mut members = compose_members(self)?;
        self.suite.stubs.merge(&self.obj, "", &mut members);
        Ok(members)
    }

    /// Direct child modules; `__all__` decides which ones when present,
    /// otherwise private names are skipped
    fn submodules(&self) -> Vec<Rc<Module>> {
        if !is_package(&self.obj) {
            return Vec::new();
        }
        let all = get_all(&self.obj);
        let program = self.program();

        let mut submodules = Vec::new();
        for name in program.child_module_names(self.obj.id()) {
            let include = match &all {
                Some(all) => all.contains(&name),
                None => !name.starts_with('_'),
            };
            if !include {
                continue;
            }
            let fullname = format!("{}.{}", self.modulename, name);
            match self.suite.module(&fullname) {
                Ok(module) => submodules.push(module),
                Err(e) => warn!("Couldn't import {}: {}", fullname, e),
            }
        }
        submodules
    }

    fn key(&self) -> ParserKey {
        ParserKey::SourceCodeModule(self.obj.clone())
    }
}

/// Variable docs and annotations of a class and its ancestors, nearest first
#[derive(Debug, Default)]
struct InheritedTables {
    docstrings: IndexMap<String, String>,
    /// Annotation text with the class that declares it
    annotations: IndexMap<String, (String, ObjectId)>,
    definitions: HashMap<String, Definition>,
}

/// Declaration site of a member with the MRO distance of the declaring class
#[derive(Debug, Clone)]
struct Definition {
    location: Location,
    depth: usize,
}

#[derive(Debug)]
struct ClassMembers {
    values: IndexMap<String, DefaultValue>,
    definitions: HashMap<String, Location>,
}

/// Resolves the members of a class, including inherited ones
pub struct SourceCodeClassParser {
    suite: Rc<SourceCodeParserSuite>,
    obj: PyRef,
    modulename: String,
    qualname: String,
    tables: OnceCell<InheritedTables>,
    var_annotations: OnceCell<IndexMap<String, TypeExpr>>,
    resolved: OnceCell<ClassMembers>,
}

impl fmt::Debug for SourceCodeClassParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCodeClassParser")
            .field("class", &format!("{}.{}", self.modulename, self.qualname))
            .finish()
    }
}

impl SourceCodeClassParser {
    pub fn new(suite: Rc<SourceCodeParserSuite>, obj: PyRef) -> Result<Self> {
        let (modulename, qualname) = obj
            .object()
            .as_class()
            .map(|c| (c.module.clone(), c.qualname.clone()))
            .ok_or_else(|| DocprobeError::UnsupportedObject(type_name(&obj)))?;
        Ok(Self {
            suite,
            obj,
            modulename,
            qualname,
            tables: OnceCell::new(),
            var_annotations: OnceCell::new(),
            resolved: OnceCell::new(),
        })
    }

    /// Ancestors in method resolution order, starting with the class itself
    /// and leaving out `object`
    fn lineage(&self) -> Vec<ObjectId> {
        let program = self.obj.program();
        let object = program.builtins().object;
        program
            .class(self.obj.id())
            .map(|c| c.mro.iter().copied().filter(|id| *id != object).collect())
            .unwrap_or_default()
    }

    /// Fold the scanned tables of every ancestor, nearest declaration first
    fn tables(&self) -> Result<&InheritedTables> {
        self.tables.get_or_try_init(|| {
            let program = self.obj.program();
            let mut tables = InheritedTables::default();
            for (depth, id) in self.lineage().into_iter().enumerate() {
                let Some(class) = program.class(id) else {
                    continue;
                };
                let scanner = self.suite.scanner(&class.module);
                let docstrings = scanner.docstrings_in_namespace(&class.qualname)?;
                let annotations = scanner.annotations_in_namespace(&class.qualname)?;

                for name in docstrings.keys().chain(annotations.keys()) {
                    tables.definitions.entry(name.clone()).or_insert_with(|| Definition {
                        location: (class.module.clone(), join_qualname(&class.qualname, name)),
                        depth,
                    });
                }
                for (name, docstring) in docstrings {
                    tables.docstrings.entry(name).or_insert(docstring);
                }
                for (name, annotation) in annotations {
                    tables.annotations.entry(name).or_insert((annotation, id));
                }
            }
            Ok(tables)
        })
    }

    /// Where each scanned or declared name comes from, and the `Definition`
    /// table after the MRO walk
    fn resolve(&self) -> Result<&ClassMembers> {
        self.resolved.get_or_try_init(|| {
            let program = self.obj.program();
            let own_location = |name: &str| (self.modulename.clone(), join_qualname(&self.qualname, name));
            let mut definitions = self.tables()?.definitions.clone();
            let mut values: IndexMap<String, DefaultValue> = IndexMap::new();

            for (depth, id) in self.lineage().into_iter().enumerate() {
                let Some(class) = program.class(id) else {
                    continue;
                };
                for (name, value) in &class.dict {
                    values
                        .entry(name.clone())
                        .or_insert_with(|| DefaultValue::Value(self.obj.sibling(*value)));
                    let location = (class.module.clone(), join_qualname(&class.qualname, name));
                    record_nearest(&mut definitions, name, location, depth);
                }
            }

            for attr in FORCED_ATTRIBUTES {
                if let Some(value) = safe_getattr(&self.obj, attr) {
                    values.insert(attr.to_string(), DefaultValue::Value(value));
                }
                definitions.insert(attr.to_string(), Definition { location: own_location(attr), depth: 0 });
            }

            for name in self.vars_sets()? {
                if !values.contains_key(&name) {
                    values.insert(name.clone(), safe_getattr(&self.obj, &name).into());
                }
            }

            self.apply_constructor_rules(&mut values);

            Ok(ClassMembers {
                values,
                definitions: definitions.into_iter().map(|(name, d)| (name, d.location)).collect(),
            })
        })
    }

    /// Drop undocumented constructors of abstract, enum and mapping classes,
    /// and prefer a documented metaclass `__call__` or `__new__` otherwise
    fn apply_constructor_rules(&self, values: &mut IndexMap<String, DefaultValue>) {
        let program = self.obj.program();
        let builtins = program.builtins();

        let init_doc = match values.get("__init__") {
            Some(DefaultValue::Value(init)) => raw_doc(init),
            _ => Some(OBJECT_INIT_DOC.to_string()),
        };
        if !matches!(init_doc.as_deref(), None | Some(OBJECT_INIT_DOC)) {
            return;
        }

        if is_abstract(&self.obj) || is_subclass(&self.obj, builtins.enum_) || is_subclass(&self.obj, builtins.dict) {
            debug!("Hiding undocumented constructor of {}.{}", self.modulename, self.qualname);
            values.shift_remove("__init__");
            return;
        }

        let documented = |callable: &PyRef, default_doc: &str| {
            !is_non_user_callable(callable) && raw_doc(callable).is_some_and(|doc| doc != default_doc)
        };
        let call = metaclass(&self.obj).and_then(|meta| safe_getattr(&meta, "__call__"));
        if let Some(call) = call.filter(|c| documented(c, TYPE_CALL_DOC)) {
            values.insert("__init__".to_string(), DefaultValue::Value(call));
            return;
        }
        let new = safe_getattr(&self.obj, "__new__");
        if let Some(new) = new.filter(|n| documented(n, OBJECT_NEW_DOC)) {
            values.insert("__init__".to_string(), DefaultValue::Value(new));
        }
    }
}

fn record_nearest(definitions: &mut HashMap<String, Definition>, name: &str, location: Location, depth: usize) {
    match definitions.get(name) {
        Some(existing) if existing.depth <= depth => {}
        _ => {
            definitions.insert(name.to_string(), Definition { location, depth });
        }
    }
}

impl MemberSource for SourceCodeClassParser {
    fn suite(&self) -> &Rc<SourceCodeParserSuite> {
        &self.suite
    }

    fn context(&self) -> &PyRef {
        &self.obj
    }

    fn modulename(&self) -> &str {
        &self.modulename
    }

    fn qualname(&self) -> &str {
        &self.qualname
    }

    fn member_objects(&self) -> Result<IndexMap<String, DefaultValue>> {
        Ok(self.resolve()?.values.clone())
    }

    fn var_docstring(&self) -> Result<&IndexMap<String, String>> {
        Ok(&self.tables()?.docstrings)
    }

    /// Scanned annotations of the class and its ancestors, overridden by the
    /// class's own `__annotations__`, each resolved where it was declared
    fn var_annotations(&self) -> Result<&IndexMap<String, TypeExpr>> {
        self.var_annotations.get_or_try_init(|| {
            let mut annotations = self.tables()?.annotations.clone();
            if let Some(class) = self.obj.object().as_class() {
                for (name, text) in &class.annotations {
                    annotations.insert(name.clone(), (text.clone(), self.obj.id()));
                }
            }
            Ok(annotations
                .into_iter()
                .map(|(name, (text, declared_in))| {
                    let context = self.obj.sibling(declared_in);
                    let fullname = format!("{}.{}", self.qualname, name);
                    (name, annotations::resolve(&text, &context, &fullname))
                })
                .collect())
        })
    }

    fn taken_from(&self, name: &str, _value: &DefaultValue) -> Result<Location> {
        Ok(match self.resolve()?.definitions.get(name) {
            Some(location) => location.clone(),
            None => {
                warn!(
                    "Cannot determine where {}.{}.{} is taken from, assuming current file.",
                    self.modulename, self.qualname, name
                );
                (self.modulename.clone(), join_qualname(&self.qualname, name))
            }
        })
    }
}

impl Parser for SourceCodeClassParser {
    fn members(&self) -> Result<IndexMap<String, Doc>> {
        debug!("Resolving members of class {}.{}", self.modulename, self.qualname);
        let mut members = compose_members(self)?;
        self.suite.stubs.merge(&self.obj, &self.qualname, &mut members);
        Ok(members)
    }

    fn key(&self) -> ParserKey {
        ParserKey::SourceCodeClass(self.obj.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Namespace;
    use crate::core::program::LoadOptions;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        _dir: tempfile::TempDir,
        suite: Rc<SourceCodeParserSuite>,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        fixture_with(files, SourceCodeOptions::default())
    }

    fn fixture_with(files: &[(&str, &str)], options: SourceCodeOptions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for (path, source) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap_or(Path::new("."))).unwrap();
            fs::write(path, source).unwrap();
        }
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        Fixture {
            _dir: dir,
            suite: SourceCodeParserSuite::new(program, options),
        }
    }

    fn class(module: &Module, name: &str) -> Rc<Class> {
        module.members()[name].as_class().unwrap().clone()
    }

    const INHERITANCE: &str = r#"
class A:
    def __init__(self):
        self.attr3: float = 1.0
        """attribute docstring"""

    def method(self):
        """A method."""

    def greet(self):
        """Hello from A."""


class Mid(A):
    def greet(self):
        pass


class B(Mid):
    own: int = 1
    """Own variable."""
"#;

    #[test]
    fn test_inherited_instance_attribute() {
        let f = fixture(&[("m.py", INHERITANCE)]);
        let module = f.suite.module("m").unwrap();
        let b = class(&module, "B");

        let attr3 = b.members()["attr3"].as_variable().unwrap().clone();
        assert_eq!(attr3.annotation_str(), ": float");
        assert_eq!(attr3.docstring(), "attribute docstring");
        assert_eq!(attr3.base().taken_from, ("m".to_string(), "A.attr3".to_string()));
        assert_eq!(attr3.default_value_str(), "");

        let inherited = b.inherited_members();
        let from_a = &inherited[&("m".to_string(), "A".to_string())];
        assert!(from_a.iter().any(|doc| doc.name() == "attr3"));
        assert!(!b.own_members().iter().any(|doc| doc.name() == "attr3"));

        let own = b.own_members();
        let own_names: Vec<&str> = own.iter().map(|doc| doc.name()).collect();
        assert!(own_names.contains(&"own"));
        assert!(own_names.contains(&"__init__"));
    }

    #[test]
    fn test_provenance_is_nearest_declaration() {
        let f = fixture(&[("m.py", INHERITANCE)]);
        let module = f.suite.module("m").unwrap();
        let b = class(&module, "B");

        assert_eq!(b.members()["method"].taken_from(), &("m".to_string(), "A.method".to_string()));
        assert_eq!(b.members()["greet"].taken_from(), &("m".to_string(), "Mid.greet".to_string()));
        // the override is undocumented, so the docstring is inherited
        assert_eq!(b.members()["greet"].docstring(), "Hello from A.");
    }

    const REDECLARED: &str = r#"
class A:
    x: int = 0
    """Declared on A."""


class Mid(A):
    def __init__(self):
        self.x: str = "mid"
        """Redeclared by Mid."""


class C(Mid):
    pass
"#;

    #[test]
    fn test_intermediate_redeclaration_wins() {
        let f = fixture(&[("m.py", REDECLARED)]);
        let module = f.suite.module("m").unwrap();

        let x = class(&module, "C").members()["x"].as_variable().unwrap().clone();
        assert_eq!(x.docstring(), "Redeclared by Mid.");
        assert_eq!(x.annotation_str(), ": str");
        assert_eq!(x.base().taken_from, ("m".to_string(), "Mid.x".to_string()));
        assert_eq!(x.default_value_str(), " = 0");
        assert!(x.base().is_inherited());

        let x = class(&module, "A").members()["x"].as_variable().unwrap().clone();
        assert_eq!(x.docstring(), "Declared on A.");
        assert_eq!(x.annotation_str(), ": int");
        assert_eq!(x.base().taken_from, ("m".to_string(), "A.x".to_string()));
    }

    #[test]
    fn test_non_ascii_defaults_and_docstrings() {
        let source = "def greet(name=\"José\", sep='\\é'):\n    \"\"\"Grüße.\n\n    \u{a0}Détails\n    \"\"\"\n";
        let f = fixture(&[("m.py", source)]);
        let module = f.suite.module("m").unwrap();

        let greet = module.members()["greet"].as_function().unwrap().clone();
        assert_eq!(greet.signature().to_string(), "(name='José', sep='\\\\é')");
        assert_eq!(greet.docstring(), "Grüße.\n\nDétails");
    }

    #[test]
    fn test_identical_sources_share_a_scanner() {
        let source = "#: Shared doc.\nx = 1\n";
        let f = fixture(&[("a.py", source), ("b.py", source), ("c.py", "x = 2\n")]);

        assert!(Rc::ptr_eq(&f.suite.scanner("a"), &f.suite.scanner("b")));
        assert!(!Rc::ptr_eq(&f.suite.scanner("a"), &f.suite.scanner("c")));
        assert!(!Rc::ptr_eq(&f.suite.scanner("absent"), &f.suite.scanner("missing")));

        for name in ["a", "b"] {
            let module = f.suite.module(name).unwrap();
            let x = &module.members()["x"];
            assert_eq!(x.docstring(), "Shared doc.");
            assert_eq!(x.fullname(), format!("{}.x", name));
        }
    }

    #[test]
    fn test_own_and_inherited_members_partition_members() {
        let f = fixture(&[("m.py", INHERITANCE)]);
        let module = f.suite.module("m").unwrap();
        for name in ["A", "Mid", "B"] {
            let class = class(&module, name);
            let own = class.own_members();
            let inherited: Vec<Doc> = class.inherited_members().into_values().flatten().collect();

            assert_eq!(own.len() + inherited.len(), class.members().len(), "{}", name);
            for member in class.members().values() {
                let in_own = own.contains(member);
                let in_inherited = inherited.contains(member);
                assert!(in_own != in_inherited, "{} of {}", member.name(), name);
            }
        }
    }

    #[test]
    fn test_unresolved_all_entry() {
        let source = "__all__ = ['present', 'annotated', 'missing']\npresent = 1\nannotated: int\n";
        let f = fixture(&[("m.py", source)]);
        let module = f.suite.module("m").unwrap();

        let names: Vec<&String> = module.members().keys().collect();
        assert_eq!(names, ["present", "annotated", "missing"]);
        let missing = module.members()["missing"].as_variable().unwrap().clone();
        assert!(missing.default_value.is_empty());
        let annotated = module.members()["annotated"].as_variable().unwrap().clone();
        assert_eq!(annotated.annotation_str(), ": int");
        assert!(annotated.default_value.is_empty());

        let options = SourceCodeOptions {
            unresolved_all_entries: UnresolvedPolicy::Skip,
            ..SourceCodeOptions::default()
        };
        let f = fixture_with(&[("m.py", source)], options);
        let module = f.suite.module("m").unwrap();
        assert!(!module.members().contains_key("missing"));
    }

    #[test]
    fn test_module_members_without_all() {
        let f = fixture(&[
            ("other.py", "class Helper:\n    pass\n"),
            (
                "m.py",
                r#"
import os
from typing import TypeVar
from other import Helper

T = TypeVar("T")
CONSTANT = 3

#: Documented value.
documented = 4

def func():
    pass

class Local:
    pass

instance = Local()
"#,
            ),
        ]);
        let module = f.suite.module("m").unwrap();
        let names: Vec<&String> = module.members().keys().collect();
        assert_eq!(names, ["documented", "func", "Local", "instance"]);
        assert_eq!(module.members()["documented"].docstring(), "Documented value.");
        assert_eq!(module.functions().len(), 1);
        assert_eq!(module.classes().len(), 1);
        assert_eq!(module.variables().len(), 2);
        assert_eq!(module.members()["instance"].taken_from(), &("m".to_string(), "instance".to_string()));
    }

    #[test]
    fn test_reexported_class_keeps_origin() {
        let f = fixture(&[
            ("pkg/__init__.py", "from pkg._impl import Engine\n__all__ = ['Engine']\n"),
            ("pkg/_impl.py", "class Engine:\n    \"\"\"Runs things.\"\"\"\n\n    def start(self):\n        pass\n"),
        ]);
        let module = f.suite.module("pkg").unwrap();
        let engine = class(&module, "Engine");
        assert_eq!(engine.base().taken_from, ("pkg._impl".to_string(), "Engine".to_string()));
        assert!(engine.base().is_inherited());
        // members declared at the original location count as own members
        assert!(engine.own_members().iter().any(|doc| doc.name() == "start"));
    }

    #[test]
    fn test_submodules() {
        let f = fixture(&[
            ("pkg/__init__.py", ""),
            ("pkg/alpha.py", "x = 1\n"),
            ("pkg/_hidden.py", ""),
            ("pkg/sub/__init__.py", ""),
            ("listed/__init__.py", "__all__ = ['_hidden']\n"),
            ("listed/_hidden.py", ""),
            ("listed/shown.py", ""),
        ]);
        let pkg = f.suite.module("pkg").unwrap();
        assert!(pkg.is_package());
        let names: Vec<&str> = pkg.submodules().iter().map(|m| m.base().fullname()).collect();
        assert_eq!(names, ["pkg.alpha", "pkg.sub"]);
        assert!(pkg.submodules()[0].submodules().is_empty());

        let listed = f.suite.module("listed").unwrap();
        let names: Vec<&str> = listed.submodules().iter().map(|m| m.base().fullname()).collect();
        assert_eq!(names, ["listed._hidden"]);
    }

    const CONSTRUCTORS: &str = r#"
from abc import ABC, abstractmethod
from enum import Enum


class Mapping(dict):
    pass


class DocumentedMapping(dict):
    def __init__(self):
        """Custom constructor."""


class Meta(type):
    def __call__(cls, *args, **kwargs):
        """Create through the registry."""


class Registered(metaclass=Meta):
    pass


class WithNew:
    def __new__(cls, value):
        """Build from a value."""


class Color(Enum):
    RED = 1


class Shape(ABC):
    @abstractmethod
    def area(self):
        pass


class Plain:
    pass
"#;

    #[test]
    fn test_constructor_suppression() {
        let f = fixture(&[("m.py", CONSTRUCTORS)]);
        let module = f.suite.module("m").unwrap();

        for hidden in ["Mapping", "Color", "Shape"] {
            assert!(!class(&module, hidden).members().contains_key("__init__"), "{}", hidden);
        }

        let documented = class(&module, "DocumentedMapping");
        assert_eq!(documented.members()["__init__"].docstring(), "Custom constructor.");

        let registered = class(&module, "Registered");
        let init = registered.members()["__init__"].as_function().unwrap().clone();
        assert_eq!(init.docstring(), "Create through the registry.");
        assert_eq!(init.base().taken_from, ("m".to_string(), "Registered.__init__".to_string()));

        let with_new = class(&module, "WithNew");
        assert_eq!(with_new.members()["__init__"].docstring(), "Build from a value.");

        let plain = class(&module, "Plain");
        let init = plain.members()["__init__"].as_function().unwrap().clone();
        assert_eq!(init.signature().to_string(), "()");
        assert_eq!(init.docstring(), "");
    }

    #[test]
    fn test_member_classification() {
        let f = fixture(&[(
            "m.py",
            r#"
from functools import cached_property
from typing import ClassVar


class P:
    limit: ClassVar[int] = 3
    x = 1  #: doc for x
    __slots__ = ("slot",)

    @property
    def size(self) -> int:
        """The size."""

    @cached_property
    def total(self) -> float:
        """The total."""

    @classmethod
    def build(cls):
        pass

    @staticmethod
    def util():
        pass

    def run(self):
        pass
"#,
        )]);
        let module = f.suite.module("m").unwrap();
        let p = class(&module, "P");

        let size = p.members()["size"].as_variable().unwrap().clone();
        assert_eq!(size.annotation_str(), ": int");
        assert_eq!(size.docstring(), "The size.");
        assert_eq!(size.default_value_str(), "");
        let total = p.members()["total"].as_variable().unwrap().clone();
        assert_eq!(total.annotation_str(), ": float");

        let x = p.members()["x"].as_variable().unwrap().clone();
        assert_eq!(x.docstring(), "doc for x");
        assert_eq!(x.default_value_str(), " = 1");
        assert!(matches!(p.members()["slot"], Doc::Variable(_)));

        let names = |functions: Vec<Rc<Function>>| functions.iter().map(|f| f.base().name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(p.classmethods()), ["build"]);
        assert_eq!(names(p.staticmethods()), ["util"]);
        assert!(names(p.methods()).contains(&"run".to_string()));

        let class_vars: Vec<String> = p.class_variables().iter().map(|v| v.base().name().to_string()).collect();
        assert_eq!(class_vars, ["limit"]);
        assert!(p.instance_variables().iter().any(|v| v.base().name() == "x"));
    }

    #[test]
    fn test_lookup_by_identifier() {
        let f = fixture(&[("m.py", INHERITANCE)]);
        let module = f.suite.module("m").unwrap();
        let found = module.get("B.attr3").unwrap();
        assert_eq!(found.kind(), "variable");
        assert_eq!(found.fullname(), "m.B.attr3");
        assert!(module.get("B.nothing").is_none());
        assert!(module.get("B.attr3.deeper").is_none());
        // memoized lookups return the same object
        assert_eq!(module.get("B.attr3"), Some(found));
    }

    #[test]
    fn test_unsupported_object() {
        let f = fixture(&[("m.py", "x = 3\n")]);
        let module = f.suite.program().module_id("m").unwrap();
        let module = PyRef::new(f.suite.program().clone(), module);
        let value = safe_getattr(&module, "x").unwrap();

        let err = f.suite.document(&value).unwrap_err();
        assert!(matches!(err, DocprobeError::UnsupportedObject(ref t) if t == "<class 'int'>"));
        assert!(matches!(f.suite.module("absent"), Err(DocprobeError::Import { .. })));
        assert!(matches!(f.suite.document(&module), Ok(Doc::Module(_))));
    }
}
