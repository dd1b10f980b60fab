use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};
use tree_sitter::Node;

use super::{
    mro, Arena, Builtins, ClassObject, FunctionObject, MemberDescriptor, ModuleObject, ObjectId, Origin, ParamDecl,
    ParamKind, Program, PropertyObject, PyObject, SourceEncoding, SourceFile, ValueKind, ValueObject,
};
use crate::config::Config;
use crate::core::inspect::cleandoc;
use crate::core::syntax::{self, node_text, python_str_repr, statements};
use crate::error::{DocprobeError, Result};

/// Where to find modules and how to read them
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub roots: Vec<PathBuf>,
    pub ignore_patterns: Vec<String>,
    pub encoding: SourceEncoding,
    pub max_file_size: usize,
}

impl LoadOptions {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ignore_patterns: vec!["__pycache__/".to_string()],
            encoding: SourceEncoding::Utf8,
            max_file_size: 1024 * 1024,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            roots: config.project.source_dirs.clone(),
            ignore_patterns: config.project.ignore_patterns.clone(),
            encoding: SourceEncoding::from_label(&config.parsing.encoding)?,
            max_file_size: config.parsing.max_file_size,
        })
    }
}

#[derive(Debug, Clone)]
struct ModuleFile {
    path: PathBuf,
    is_package: bool,
}

/// Execution context of the statement being loaded
#[derive(Clone, Copy)]
struct Frame<'f> {
    module: ObjectId,
    module_name: &'f str,
    is_package: bool,
    class: Option<ObjectId>,
    prefix: &'f str,
    source: &'f str,
}

/// Executes the declaration-level statements of every discovered module
pub struct Loader {
    options: LoadOptions,
    arena: Arena,
    builtins: Builtins,
    index: IndexMap<String, ModuleFile>,
    failed: IndexMap<String, String>,
    foreign: HashMap<String, ObjectId>,
    soft_failures: usize,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Result<Self> {
        for root in &options.roots {
            if !root.is_dir() {
                return Err(DocprobeError::Config(format!("source directory {} does not exist", root.display())));
            }
        }
        let mut loader = Self::builtins_only();
        loader.options = options;
        Ok(loader)
    }

    pub(crate) fn builtins_only() -> Self {
        let mut arena = Arena::default();
        let builtins = Builtins::install(&mut arena);
        Self {
            options: LoadOptions::new(Vec::<PathBuf>::new()),
            arena,
            builtins,
            index: IndexMap::new(),
            failed: IndexMap::new(),
            foreign: HashMap::new(),
            soft_failures: 0,
        }
    }

    /// Discover every module under the roots and load all of them
    pub fn run(mut self) -> Result<Program> {
        self.discover()?;
        info!("Discovered {} modules", self.index.len());

        let names: Vec<String> = self.index.keys().cloned().collect();
        for name in names {
            if let Err(reason) = self.import(&name) {
                debug!("Module {} not loaded: {}", name, reason);
            }
        }
        Ok(self.finish())
    }

    pub(crate) fn finish(self) -> Program {
        Program::from_parts(self.arena, self.failed, self.builtins)
    }

    fn discover(&mut self) -> Result<()> {
        let roots = self.options.roots.clone();
        for root in roots {
            let patterns: Vec<String> = self
                .options
                .ignore_patterns
                .iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .collect();

            let walker = ignore::WalkBuilder::new(&root)
                .hidden(false)
                .git_ignore(true)
                .filter_entry(move |entry| {
                    let name = entry.file_name().to_string_lossy();
                    !patterns.iter().any(|p| *p == name)
                })
                .sort_by_file_path(|a, b| a.cmp(b))
                .build();

            for entry in walker {
                let entry = entry.map_err(|e| DocprobeError::Config(e.to_string()))?;
                let path = entry.path();
                if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("py") {
                    continue;
                }
                if let Some((name, is_package)) = module_name(&root, path) {
                    self.index.entry(name).or_insert(ModuleFile {
                        path: path.to_path_buf(),
                        is_package,
                    });
                }
            }
        }
        Ok(())
    }

    /// Import a module by absolute name, loading its parents first
    fn import(&mut self, name: &str) -> std::result::Result<ObjectId, String> {
        if let Some(id) = self.arena.module_id(name) {
            return Ok(id);
        }
        if let Some(reason) = self.failed.get(name) {
            return Err(reason.clone());
        }

        let parent = match name.rsplit_once('.') {
            Some((parent, _)) => Some(self.import(parent)?),
            None => None,
        };

        let Some(file) = self.index.get(name).cloned() else {
            return Err(format!("No module named '{}'", name));
        };
        let id = self.load_file(name, &file)?;

        if let (Some(parent), Some((_, child))) = (parent, name.rsplit_once('.')) {
            if let Some(module) = self.arena.module_mut(parent) {
                module.dict.insert(child.to_string(), id);
            }
        }
        Ok(id)
    }

    fn load_file(&mut self, name: &str, file: &ModuleFile) -> std::result::Result<ObjectId, String> {
        debug!("Loading module {} from {}", name, file.path.display());

        let source = match self.read_source(&file.path) {
            Ok(source) => Rc::new(source),
            Err(e) => {
                warn!("Couldn't import {}: {}", name, e);
                self.failed.insert(name.to_string(), e.to_string());
                return Err(e.to_string());
            }
        };

        let tree = match syntax::parse_source(&source.text, name) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Couldn't import {}: {}", name, e);
                self.failed.insert(name.to_string(), e.to_string());
                return Err(e.to_string());
            }
        };
        let root = tree.root_node();

        let module = self.arena.register_module(ModuleObject {
            name: name.to_string(),
            doc: syntax::body_docstring(root, &source.text),
            dict: IndexMap::new(),
            annotations: IndexMap::new(),
            package_dir: if file.is_package { file.path.parent().map(Path::to_path_buf) } else { None },
            source: Some(source.clone()),
            origin: Origin::Source,
        });

        let frame = Frame {
            module,
            module_name: name,
            is_package: file.is_package,
            class: None,
            prefix: "",
            source: &source.text,
        };
        self.exec_block(root, frame);
        Ok(module)
    }

    fn read_source(&self, path: &Path) -> Result<SourceFile> {
        let size = std::fs::metadata(path)?.len() as usize;
        if size > self.options.max_file_size {
            return Err(DocprobeError::Config(format!("File {} exceeds maximum size limit", path.display())));
        }
        SourceFile::read(path, self.options.encoding)
    }

    fn exec_block(&mut self, block: Node, frame: Frame) {
        for stmt in statements(block) {
            self.exec_statement(stmt, frame);
        }
    }

    fn exec_statement(&mut self, stmt: Node, frame: Frame) {
        match stmt.kind() {
            "import_statement" => self.exec_import(stmt, frame),
            "import_from_statement" => self.exec_import_from(stmt, frame),
            "class_definition" => self.exec_class(stmt, &[], frame),
            "function_definition" => self.exec_function(stmt, &[], frame),
            "decorated_definition" => {
                let mut cursor = stmt.walk();
                let decorators: Vec<Node> = stmt
                    .named_children(&mut cursor)
                    .filter(|child| child.kind() == "decorator")
                    .collect();
                if let Some(definition) = stmt.child_by_field_name("definition") {
                    match definition.kind() {
                        "class_definition" => self.exec_class(definition, &decorators, frame),
                        "function_definition" => self.exec_function(definition, &decorators, frame),
                        _ => {}
                    }
                }
            }
            "expression_statement" => self.exec_expression_statement(stmt, frame),
            "if_statement" => {
                if let Some(body) = stmt.child_by_field_name("consequence") {
                    self.exec_block(body, frame);
                }
                let mut cursor = stmt.walk();
                let alternatives: Vec<Node> = stmt.children_by_field_name("alternative", &mut cursor).collect();
                for alternative in alternatives {
                    let body = alternative
                        .child_by_field_name("consequence")
                        .or_else(|| alternative.child_by_field_name("body"));
                    if let Some(body) = body {
                        self.exec_block(body, frame);
                    }
                }
            }
            "try_statement" => {
                let before = self.soft_failures;
                if let Some(body) = stmt.child_by_field_name("body") {
                    self.exec_block(body, frame);
                }
                let body_failed = self.soft_failures > before;
                let mut cursor = stmt.walk();
                let clauses: Vec<Node> = stmt.named_children(&mut cursor).collect();
                for clause in clauses {
                    let run = match clause.kind() {
                        // handlers only run when the guarded imports did not resolve
                        "except_clause" | "except_group_clause" => body_failed,
                        "else_clause" => !body_failed,
                        "finally_clause" => true,
                        _ => false,
                    };
                    if run {
                        for block in child_blocks(clause) {
                            self.exec_block(block, frame);
                        }
                    }
                }
            }
            "with_statement" => {
                if let Some(body) = stmt.child_by_field_name("body") {
                    self.exec_block(body, frame);
                }
            }
            _ => {}
        }
    }

    fn exec_import(&mut self, stmt: Node, frame: Frame) {
        let mut cursor = stmt.walk();
        let names: Vec<Node> = stmt.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            match name.kind() {
                "dotted_name" => {
                    let dotted = node_text(name, frame.source);
                    if self.import_absolute(dotted).is_some() {
                        let top = dotted.split('.').next().unwrap_or(dotted);
                        if let Some(id) = self.arena.module_id(top) {
                            self.bind(frame, top, id);
                        }
                    }
                }
                "aliased_import" => {
                    let (Some(target), Some(alias)) = (name.child_by_field_name("name"), name.child_by_field_name("alias"))
                    else {
                        continue;
                    };
                    if let Some(id) = self.import_absolute(node_text(target, frame.source)) {
                        self.bind(frame, node_text(alias, frame.source), id);
                    }
                }
                _ => {}
            }
        }
    }

    fn exec_import_from(&mut self, stmt: Node, frame: Frame) {
        let Some(module_node) = stmt.child_by_field_name("module_name") else {
            return;
        };
        let Some(target) = self.resolve_from_target(module_node, frame) else {
            return;
        };
        let Some(module) = self.import_absolute(&target) else {
            return;
        };

        let mut cursor = stmt.walk();
        let is_star = stmt.named_children(&mut cursor).any(|child| child.kind() == "wildcard_import");
        if is_star {
            for (name, value) in self.star_exports(module, &target) {
                self.bind(frame, &name, value);
            }
            return;
        }

        let mut cursor = stmt.walk();
        let names: Vec<Node> = stmt.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (imported, bound) = match name.kind() {
                "aliased_import" => match (name.child_by_field_name("name"), name.child_by_field_name("alias")) {
                    (Some(n), Some(a)) => (node_text(n, frame.source), node_text(a, frame.source)),
                    _ => continue,
                },
                _ => (node_text(name, frame.source), node_text(name, frame.source)),
            };
            if let Some(value) = self.import_name(module, &target, imported) {
                self.bind(frame, bound, value);
            }
        }
    }

    fn resolve_from_target(&mut self, node: Node, frame: Frame) -> Option<String> {
        if node.kind() != "relative_import" {
            return Some(node_text(node, frame.source).to_string());
        }

        let mut dots = 0;
        let mut dotted = None;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_prefix" => dots = node_text(child, frame.source).chars().filter(|c| *c == '.').count(),
                "dotted_name" => dotted = Some(node_text(child, frame.source)),
                _ => {}
            }
        }

        let mut package = if frame.is_package {
            frame.module_name.to_string()
        } else {
            frame.module_name.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
        };
        for _ in 1..dots {
            match package.rsplit_once('.') {
                Some((parent, _)) => package = parent.to_string(),
                None if !package.is_empty() => package.clear(),
                None => break,
            }
        }
        if package.is_empty() {
            warn!("attempted relative import beyond top-level package in {}", frame.module_name);
            self.soft_failures += 1;
            return None;
        }

        Some(match dotted {
            Some(dotted) => format!("{}.{}", package, dotted),
            None => package,
        })
    }

    /// Import an absolute module name; names outside the loaded sources become placeholders
    fn import_absolute(&mut self, name: &str) -> Option<ObjectId> {
        match self.import(name) {
            Ok(id) => Some(id),
            Err(reason) => {
                let top = name.split('.').next().unwrap_or(name);
                if !self.index.contains_key(top) {
                    return Some(self.foreign_module(name));
                }
                warn!("Cannot import {}: {}", name, reason);
                self.soft_failures += 1;
                None
            }
        }
    }

    /// Resolve `from module import name`
    fn import_name(&mut self, module: ObjectId, module_name: &str, name: &str) -> Option<ObjectId> {
        let (value, origin) = match self.arena.get(module) {
            PyObject::Module(m) => (m.dict.get(name).copied(), m.origin),
            _ => (None, Origin::Foreign),
        };
        if value.is_some() {
            return value;
        }
        let submodule = format!("{}.{}", module_name, name);
        if let Ok(id) = self.import(&submodule) {
            return Some(id);
        }
        if origin != Origin::Source {
            return Some(self.foreign_object(module_name, name));
        }
        warn!("cannot import name '{}' from '{}'", name, module_name);
        self.soft_failures += 1;
        None
    }

    fn star_exports(&mut self, module: ObjectId, module_name: &str) -> Vec<(String, ObjectId)> {
        let Some(m) = self.arena.get(module).as_module() else {
            return Vec::new();
        };
        let all = m.dict.get("__all__").and_then(|id| match self.arena.get(*id) {
            PyObject::Value(ValueObject {
                kind: ValueKind::StrList(names),
                ..
            }) => Some(names.clone()),
            _ => None,
        });

        match all {
            Some(names) => names
                .into_iter()
                .filter_map(|name| self.import_name(module, module_name, &name).map(|id| (name, id)))
                .collect(),
            None => m
                .dict
                .iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, id)| (name.clone(), *id))
                .collect(),
        }
    }

    fn foreign_module(&mut self, name: &str) -> ObjectId {
        if let Some(id) = self.arena.module_id(name) {
            return id;
        }
        let parent = name.rsplit_once('.').map(|(parent, _)| self.foreign_module(parent));
        debug!("Using placeholder for external module {}", name);
        let id = self.arena.register_module(ModuleObject {
            name: name.to_string(),
            doc: None,
            dict: IndexMap::new(),
            annotations: IndexMap::new(),
            package_dir: None,
            source: None,
            origin: Origin::Foreign,
        });
        if let (Some(parent), Some((_, child))) = (parent, name.rsplit_once('.')) {
            if let Some(module) = self.arena.module_mut(parent) {
                module.dict.insert(child.to_string(), id);
            }
        }
        id
    }

    fn foreign_object(&mut self, module: &str, qualname: &str) -> ObjectId {
        let key = format!("{}:{}", module, qualname);
        if let Some(id) = self.foreign.get(&key) {
            return *id;
        }
        let id = self.arena.alloc(PyObject::Foreign {
            module: module.to_string(),
            qualname: qualname.to_string(),
        });
        self.foreign.insert(key, id);
        id
    }

    /// A class standing in for an external base class
    fn foreign_class(&mut self, module: &str, qualname: &str) -> ObjectId {
        let key = format!("class {}:{}", module, qualname);
        if let Some(id) = self.foreign.get(&key) {
            return *id;
        }
        let object = self.builtins.object;
        let id = self.arena.alloc(PyObject::Class(ClassObject {
            name: qualname.rsplit('.').next().unwrap_or(qualname).to_string(),
            qualname: qualname.to_string(),
            module: module.to_string(),
            doc: None,
            bases: vec![object],
            orig_bases: None,
            metaclass: Some(self.builtins.type_),
            mro: Vec::new(),
            dict: IndexMap::new(),
            annotations: IndexMap::new(),
            decorators: Vec::new(),
            namespace: None,
            origin: Origin::Foreign,
        }));
        if let Some(class) = self.arena.class_mut(id) {
            class.mro = vec![id, object];
        }
        self.foreign.insert(key, id);
        id
    }

    fn bind(&mut self, frame: Frame, name: &str, value: ObjectId) {
        let dict = match frame.class {
            Some(class) => self.arena.class_mut(class).map(|c| &mut c.dict),
            None => self.arena.module_mut(frame.module).map(|m| &mut m.dict),
        };
        if let Some(dict) = dict {
            dict.insert(name.to_string(), value);
        }
    }

    fn annotate(&mut self, frame: Frame, name: &str, annotation: &str) {
        let annotations = match frame.class {
            Some(class) => self.arena.class_mut(class).map(|c| &mut c.annotations),
            None => self.arena.module_mut(frame.module).map(|m| &mut m.annotations),
        };
        if let Some(annotations) = annotations {
            annotations.insert(name.to_string(), annotation.to_string());
        }
    }

    fn lookup(&self, name: &str, frame: Frame) -> Option<ObjectId> {
        if let Some(class) = frame.class.and_then(|id| self.arena.class(id)) {
            if let Some(id) = class.dict.get(name) {
                return Some(*id);
            }
        }
        if let Some(id) = self.arena.get(frame.module).as_module().and_then(|m| m.dict.get(name)) {
            return Some(*id);
        }
        self.arena
            .get(self.builtins.builtins_module)
            .as_module()
            .and_then(|m| m.dict.get(name))
            .copied()
    }

    /// Attribute lookup without running any user code
    fn getattr_static(&mut self, object: ObjectId, attr: &str) -> Option<ObjectId> {
        match self.arena.get(object) {
            PyObject::Module(m) => {
                if let Some(id) = m.dict.get(attr) {
                    return Some(*id);
                }
                let (name, origin) = (m.name.clone(), m.origin);
                if origin == Origin::Source {
                    self.import(&format!("{}.{}", name, attr)).ok()
                } else {
                    Some(self.foreign_object(&name, attr))
                }
            }
            PyObject::Class(c) => {
                let found = c
                    .mro
                    .iter()
                    .chain(c.metaclass.map(|m| self.arena.mro_of(m)).unwrap_or_default().iter())
                    .find_map(|id| self.arena.class(*id).and_then(|k| k.dict.get(attr)).copied());
                if found.is_some() {
                    return found;
                }
                if c.origin == Origin::Foreign {
                    let (module, qualname) = (c.module.clone(), format!("{}.{}", c.qualname, attr));
                    return Some(self.foreign_object(&module, &qualname));
                }
                None
            }
            PyObject::Foreign { module, qualname } => {
                let (module, qualname) = (module.clone(), format!("{}.{}", qualname, attr));
                Some(self.foreign_object(&module, &qualname))
            }
            PyObject::Value(ValueObject {
                class: Some(class),
                kind: ValueKind::Instance,
                ..
            }) => {
                let class = *class;
                self.getattr_static(class, attr)
            }
            _ => None,
        }
    }

    fn exec_function(&mut self, node: Node, decorators: &[Node], frame: Frame) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, frame.source).to_string();
        let function = FunctionObject {
            name: name.clone(),
            qualname: format!("{}{}", frame.prefix, name),
            module: frame.module_name.to_string(),
            doc: node
                .child_by_field_name("body")
                .and_then(|body| syntax::body_docstring(body, frame.source)),
            parameters: node
                .child_by_field_name("parameters")
                .map(|params| parse_parameters(params, frame.source))
                .unwrap_or_default(),
            returns: node
                .child_by_field_name("return_type")
                .map(|ret| node_text(ret, frame.source).to_string()),
            is_async: node.child(0).is_some_and(|first| first.kind() == "async"),
            decorators: decorator_texts(decorators, frame.source),
            is_abstract: false,
        };
        let id = self.arena.alloc(PyObject::Function(function));
        let mut value = self.apply_function_decorators(id, decorators, frame);

        if frame.class.is_some() && matches!(self.arena.get(value), PyObject::Function(_)) {
            // implicit wrappers the class machinery adds
            match name.as_str() {
                "__new__" => value = self.arena.alloc(PyObject::StaticMethod(value)),
                "__init_subclass__" | "__class_getitem__" => value = self.arena.alloc(PyObject::ClassMethod(value)),
                _ => {}
            }
        }
        self.bind(frame, &name, value);
    }

    fn apply_function_decorators(&mut self, function: ObjectId, decorators: &[Node], frame: Frame) -> ObjectId {
        let mut current = function;
        for decorator in decorators.iter().rev() {
            let Some(expr) = decorator.named_child(0) else {
                continue;
            };

            // `@name.setter` and friends on a property defined earlier
            if expr.kind() == "attribute" {
                let attr = expr.child_by_field_name("attribute").map(|a| node_text(a, frame.source));
                let owner = expr.child_by_field_name("object").map(|o| self.eval(o, frame));
                if let (Some(attr @ ("setter" | "deleter" | "getter")), Some(owner)) = (attr, owner) {
                    if let PyObject::Property(property) = self.arena.get(owner).clone() {
                        let fget = if attr == "getter" { Some(current) } else { property.fget };
                        current = self.arena.alloc(PyObject::Property(PropertyObject { fget, ..property }));
                        continue;
                    }
                }
            }

            let target = self.eval(expr, frame);
            let b = &self.builtins;
            current = if target == b.classmethod {
                self.arena.alloc(PyObject::ClassMethod(current))
            } else if target == b.staticmethod {
                self.arena.alloc(PyObject::StaticMethod(current))
            } else if target == b.property {
                self.arena.alloc(PyObject::Property(PropertyObject {
                    fget: Some(current),
                    doc: None,
                    is_abstract: self.is_abstract_callable(current),
                }))
            } else if target == b.cached_property {
                self.arena.alloc(PyObject::CachedProperty(current))
            } else if target == b.abstractmethod {
                self.mark_abstract(current);
                current
            } else {
                current
            };
        }
        current
    }

    fn is_abstract_callable(&self, id: ObjectId) -> bool {
        match self.arena.get(id) {
            PyObject::Function(f) => f.is_abstract,
            PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => self.is_abstract_callable(*inner),
            _ => false,
        }
    }

    fn mark_abstract(&mut self, id: ObjectId) {
        match self.arena.get_mut(id) {
            PyObject::Function(f) => f.is_abstract = true,
            PyObject::Property(p) => p.is_abstract = true,
            PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) | PyObject::CachedProperty(inner) => {
                let inner = *inner;
                self.mark_abstract(inner);
            }
            _ => {}
        }
    }

    fn exec_class(&mut self, node: Node, decorators: &[Node], frame: Frame) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, frame.source).to_string();
        let qualname = format!("{}{}", frame.prefix, name);

        let mut bases = Vec::new();
        let mut orig_bases = Vec::new();
        let mut subscripted = false;
        let mut explicit_metaclass = None;
        if let Some(arguments) = node.child_by_field_name("superclasses") {
            let mut cursor = arguments.walk();
            let args: Vec<Node> = arguments.named_children(&mut cursor).collect();
            for arg in args {
                match arg.kind() {
                    "keyword_argument" => {
                        let key = arg.child_by_field_name("name").map(|n| node_text(n, frame.source));
                        if key == Some("metaclass") {
                            explicit_metaclass = arg.child_by_field_name("value").map(|v| self.eval(v, frame));
                        }
                    }
                    "comment" | "list_splat" | "dictionary_splat" => {}
                    _ => {
                        let value = self.eval(arg, frame);
                        match self.arena.get(value).clone() {
                            PyObject::Class(_) => {
                                bases.push(value);
                                orig_bases.push(value);
                            }
                            PyObject::GenericAlias(alias) => {
                                subscripted = true;
                                orig_bases.push(value);
                                match self.arena.get(alias.origin) {
                                    PyObject::Class(_) => bases.push(alias.origin),
                                    PyObject::SpecialForm { runtime: Some(c), .. } => bases.push(*c),
                                    _ => {}
                                }
                            }
                            PyObject::SpecialForm { runtime: Some(c), .. } => {
                                bases.push(c);
                                orig_bases.push(c);
                            }
                            PyObject::Foreign { module, qualname } => {
                                let class = self.foreign_class(&module, &qualname);
                                bases.push(class);
                                orig_bases.push(class);
                            }
                            _ => warn!(
                                "Base {} of {}.{} is not a class",
                                node_text(arg, frame.source),
                                frame.module_name,
                                qualname
                            ),
                        }
                    }
                }
            }
        }
        if bases.is_empty() {
            bases.push(self.builtins.object);
        }

        let metaclass = match explicit_metaclass {
            Some(m) if self.arena.class(m).is_some() => m,
            _ => self.derived_metaclass(&bases),
        };

        let module_value = self.str_value(frame.module_name);
        let mut dict = IndexMap::new();
        dict.insert("__module__".to_string(), module_value);

        let body = node.child_by_field_name("body");
        let doc = body.and_then(|b| syntax::body_docstring(b, frame.source));
        if let Some(doc) = &doc {
            let cleaned = self.str_value(&cleandoc(doc));
            dict.insert("__doc__".to_string(), cleaned);
        }

        let id = self.arena.alloc(PyObject::Class(ClassObject {
            name: name.clone(),
            qualname: qualname.clone(),
            module: frame.module_name.to_string(),
            doc,
            bases: bases.clone(),
            orig_bases: subscripted.then_some(orig_bases),
            metaclass: Some(metaclass),
            mro: Vec::new(),
            dict,
            annotations: IndexMap::new(),
            decorators: decorator_texts(decorators, frame.source),
            namespace: None,
            origin: Origin::Source,
        }));
        let mro = match mro::linearize(&self.arena, id, &bases) {
            Ok(mro) => mro,
            Err(e) => {
                warn!("{} in {}.{}", e, frame.module_name, qualname);
                mro::fallback(&self.arena, id, &bases)
            }
        };
        if let Some(class) = self.arena.class_mut(id) {
            class.mro = mro;
        }

        if let Some(body) = body {
            let prefix = format!("{}.", qualname);
            let class_frame = Frame {
                class: Some(id),
                prefix: &prefix,
                ..frame
            };
            self.exec_block(body, class_frame);
        }
        self.finalize_class(id);

        // class decorators return the class unchanged
        for decorator in decorators {
            if let Some(expr) = decorator.named_child(0) {
                self.eval(expr, frame);
            }
        }
        self.bind(frame, &name, id);
    }

    fn derived_metaclass(&self, bases: &[ObjectId]) -> ObjectId {
        let mut winner = self.builtins.type_;
        for base in bases {
            let candidate = self
                .arena
                .class(*base)
                .and_then(|c| c.metaclass)
                .unwrap_or(self.builtins.type_);
            if self.arena.is_subclass(candidate, winner) {
                winner = candidate;
            }
        }
        winner
    }

    /// Add the attributes `type()` creates alongside the class body
    fn finalize_class(&mut self, id: ObjectId) {
        let Some(class) = self.arena.class(id) else {
            return;
        };
        let qualname = class.qualname.clone();
        let slots = class.dict.get("__slots__").and_then(|slots| match self.arena.get(*slots) {
            PyObject::Value(ValueObject {
                kind: ValueKind::StrList(names),
                ..
            }) => Some(names.clone()),
            PyObject::Value(ValueObject {
                kind: ValueKind::Str(name),
                ..
            }) => Some(vec![name.clone()]),
            _ => None,
        });
        let inherits_dict = class.mro[1..]
            .iter()
            .any(|base| self.arena.class(*base).is_some_and(|b| b.dict.contains_key("__dict__")));
        let annotations_repr = format!(
            "{{{}}}",
            class
                .annotations
                .iter()
                .map(|(k, v)| format!("{}: {}", python_str_repr(k), python_str_repr(v)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let has_doc = class.dict.contains_key("__doc__");

        let mut extra: Vec<(String, ObjectId)> = Vec::new();
        let dict_class = Some(self.builtins.dict);
        extra.push((
            "__annotations__".to_string(),
            self.arena.alloc(PyObject::Value(ValueObject {
                class: dict_class,
                repr: Some(annotations_repr),
                kind: ValueKind::Literal,
            })),
        ));
        match slots {
            Some(names) => {
                for name in names {
                    let descriptor = self.descriptor(&name, &qualname, None);
                    extra.push((name, descriptor));
                }
            }
            None if !inherits_dict => {
                let dict = self.descriptor("__dict__", &qualname, Some("dictionary for instance variables"));
                let weakref = self.descriptor("__weakref__", &qualname, Some("list of weak references to the object"));
                extra.push(("__dict__".to_string(), dict));
                extra.push(("__weakref__".to_string(), weakref));
            }
            None => {}
        }
        if !has_doc {
            let none = self.literal(None, "None");
            extra.push(("__doc__".to_string(), none));
        }

        let namespace = self.arena.alloc(PyObject::Value(ValueObject {
            class: None,
            repr: None,
            kind: ValueKind::Namespace(id),
        }));
        if let Some(class) = self.arena.class_mut(id) {
            for (name, value) in extra {
                class.dict.entry(name).or_insert(value);
            }
            class.namespace = Some(namespace);
        }
    }

    fn descriptor(&mut self, name: &str, owner: &str, doc: Option<&str>) -> ObjectId {
        self.arena.alloc(PyObject::MemberDescriptor(MemberDescriptor {
            name: name.to_string(),
            owner: owner.to_string(),
            doc: doc.map(str::to_string),
        }))
    }

    fn exec_expression_statement(&mut self, stmt: Node, frame: Frame) {
        let Some(expr) = stmt.named_child(0) else {
            return;
        };
        match expr.kind() {
            "assignment" => self.exec_assignment(expr, frame),
            "augmented_assignment" => {
                let left = expr.child_by_field_name("left").map(|n| node_text(n, frame.source));
                let op = expr.child_by_field_name("operator").map(|n| node_text(n, frame.source));
                if let (Some("__all__"), Some("+="), Some(right)) = (left, op, expr.child_by_field_name("right")) {
                    self.extend_all(right, frame);
                }
            }
            "call" => {
                // __all__.extend([...]) / __all__.append("name")
                let Some(function) = expr.child_by_field_name("function") else {
                    return;
                };
                if function.kind() != "attribute" {
                    return;
                }
                let owner = function.child_by_field_name("object").map(|n| node_text(n, frame.source));
                let method = function.child_by_field_name("attribute").map(|n| node_text(n, frame.source));
                let argument = expr.child_by_field_name("arguments").and_then(|a| a.named_child(0));
                match (owner, method, argument) {
                    (Some("__all__"), Some("extend"), Some(arg)) => self.extend_all(arg, frame),
                    (Some("__all__"), Some("append"), Some(arg)) => {
                        if let Some(name) = syntax::string_value(arg, frame.source) {
                            self.push_all(frame, vec![name]);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn extend_all(&mut self, value: Node, frame: Frame) {
        let id = self.eval(value, frame);
        if let PyObject::Value(ValueObject {
            kind: ValueKind::StrList(names),
            ..
        }) = self.arena.get(id)
        {
            let names = names.clone();
            self.push_all(frame, names);
        }
    }

    fn push_all(&mut self, frame: Frame, names: Vec<String>) {
        let mut all = match self.lookup("__all__", frame).map(|id| self.arena.get(id)) {
            Some(PyObject::Value(ValueObject {
                kind: ValueKind::StrList(existing),
                ..
            })) => existing.clone(),
            _ => Vec::new(),
        };
        all.extend(names);
        let value = self.str_list(&all, false);
        self.bind(frame, "__all__", value);
    }

    fn exec_assignment(&mut self, node: Node, frame: Frame) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if let (Some(annotation), "identifier") = (node.child_by_field_name("type"), left.kind()) {
            self.annotate(frame, node_text(left, frame.source), node_text(annotation, frame.source));
        }
        let Some(mut right) = node.child_by_field_name("right") else {
            return;
        };

        let mut targets = vec![left];
        while right.kind() == "assignment" {
            if let Some(next_left) = right.child_by_field_name("left") {
                targets.push(next_left);
            }
            match right.child_by_field_name("right") {
                Some(next) => right = next,
                None => return,
            }
        }

        let value = self.eval(right, frame);
        for target in targets {
            self.assign_target(target, value, Some(right), frame);
        }
    }

    fn assign_target(&mut self, target: Node, value: ObjectId, value_node: Option<Node>, frame: Frame) {
        match target.kind() {
            "identifier" => {
                let name = node_text(target, frame.source);
                let value = self.enum_member(frame, name, value);
                self.bind(frame, name, value);
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list" => {
                let targets = named_elements(target);
                let values = value_node
                    .filter(|v| matches!(v.kind(), "expression_list" | "tuple" | "list"))
                    .map(named_elements)
                    .filter(|values| values.len() == targets.len() && values.iter().all(|v| v.kind() != "list_splat"));
                match values {
                    Some(values) => {
                        for (t, v) in targets.into_iter().zip(values) {
                            let element = self.eval(v, frame);
                            self.assign_target(t, element, Some(v), frame);
                        }
                    }
                    None => {
                        for t in targets {
                            let unpacked = self.opaque(node_text(t, frame.source));
                            self.assign_target(t, unpacked, None, frame);
                        }
                    }
                }
            }
            "list_splat_pattern" => {
                if let Some(inner) = target.named_child(0) {
                    let unpacked = self.opaque(node_text(inner, frame.source));
                    self.assign_target(inner, unpacked, None, frame);
                }
            }
            _ => {}
        }
    }

    /// Plain values assigned in the body of an enum become members of that enum
    fn enum_member(&mut self, frame: Frame, name: &str, value: ObjectId) -> ObjectId {
        let Some(class) = frame.class.and_then(|id| self.arena.class(id)) else {
            return value;
        };
        let is_enum = class.metaclass.is_some_and(|m| self.arena.is_subclass(m, self.builtins.enum_meta));
        if !is_enum || name.starts_with('_') {
            return value;
        }
        let PyObject::Value(inner) = self.arena.get(value) else {
            return value;
        };
        let repr = format!("<{}.{}: {}>", class.name, name, inner.repr.as_deref().unwrap_or("..."));
        let class_id = frame.class;
        self.arena.alloc(PyObject::Value(ValueObject {
            class: class_id,
            repr: Some(repr),
            kind: ValueKind::Instance,
        }))
    }

    fn eval(&mut self, node: Node, frame: Frame) -> ObjectId {
        let text = node_text(node, frame.source);
        match node.kind() {
            "identifier" => match text {
                "__name__" => self.str_value(frame.module_name),
                _ => self.lookup(text, frame).unwrap_or_else(|| self.opaque(text)),
            },
            "attribute" => {
                let (Some(object), Some(attr)) = (node.child_by_field_name("object"), node.child_by_field_name("attribute"))
                else {
                    return self.opaque(text);
                };
                let owner = self.eval(object, frame);
                self.getattr_static(owner, node_text(attr, frame.source))
                    .unwrap_or_else(|| self.opaque(text))
            }
            "call" => self.eval_call(node, frame),
            "subscript" => {
                let Some(value) = node.child_by_field_name("value") else {
                    return self.opaque(text);
                };
                let origin = self.eval(value, frame);
                let origin = match self.arena.get(origin) {
                    PyObject::Class(_) | PyObject::SpecialForm { .. } => origin,
                    PyObject::GenericAlias(alias) => alias.origin,
                    _ => return self.opaque(text),
                };
                let repr = self.type_repr(node, frame);
                self.arena.alloc(PyObject::GenericAlias(super::GenericAlias { origin, text: repr }))
            }
            "string" | "concatenated_string" => match syntax::string_value(node, frame.source) {
                Some(value) => self.str_value(&value),
                // formatted strings have no static value
                None if is_formatted(node, frame.source) => self.arena.alloc(PyObject::Value(ValueObject {
                    class: Some(self.builtins.str_),
                    repr: None,
                    kind: ValueKind::Expression,
                })),
                None => self.literal(None, text),
            },
            "integer" => self.literal(Some(self.builtins.int), text),
            "float" => self.literal(Some(self.builtins.float), text),
            "true" | "false" => self.literal(Some(self.builtins.bool_), text),
            "none" => self.literal(None, "None"),
            "ellipsis" => self.literal(None, "Ellipsis"),
            "unary_operator" => match node.child_by_field_name("argument").map(|a| a.kind()) {
                Some("integer") => self.literal(Some(self.builtins.int), text),
                Some("float") => self.literal(Some(self.builtins.float), text),
                _ => self.opaque(text),
            },
            "list" | "tuple" => {
                let elements = named_elements(node);
                let strings: Option<Vec<String>> = elements
                    .iter()
                    .map(|e| syntax::string_value(*e, frame.source))
                    .collect();
                match strings {
                    Some(names) if !elements.is_empty() || node.kind() == "list" => {
                        self.str_list(&names, node.kind() == "tuple")
                    }
                    _ => {
                        let class = if node.kind() == "list" { self.builtins.list } else { self.builtins.tuple };
                        self.literal(Some(class), text)
                    }
                }
            }
            "dictionary" => self.literal(Some(self.builtins.dict), text),
            "parenthesized_expression" => match node.named_child(0) {
                Some(inner) => self.eval(inner, frame),
                None => self.opaque(text),
            },
            "lambda" => {
                let parameters = node
                    .child_by_field_name("parameters")
                    .map(|p| parse_parameters(p, frame.source))
                    .unwrap_or_default();
                self.arena.alloc(PyObject::Function(FunctionObject {
                    name: "<lambda>".to_string(),
                    qualname: format!("{}<lambda>", frame.prefix),
                    module: frame.module_name.to_string(),
                    doc: None,
                    parameters,
                    returns: None,
                    is_async: false,
                    decorators: Vec::new(),
                    is_abstract: false,
                }))
            }
            _ => self.opaque(text),
        }
    }

    fn eval_call(&mut self, node: Node, frame: Frame) -> ObjectId {
        let text = node_text(node, frame.source);
        let Some(function) = node.child_by_field_name("function") else {
            return self.opaque(text);
        };
        let callee = self.eval(function, frame);
        let arguments = node.child_by_field_name("arguments");
        let positional: Vec<Node> = arguments
            .map(|args| {
                named_elements(args)
                    .into_iter()
                    .filter(|a| a.kind() != "keyword_argument")
                    .collect()
            })
            .unwrap_or_default();
        let keyword = |name: &str| -> Option<Node> {
            let args = arguments?;
            named_elements(args).into_iter().find_map(|a| {
                (a.kind() == "keyword_argument"
                    && a.child_by_field_name("name").map(|n| node_text(n, frame.source)) == Some(name))
                .then(|| a.child_by_field_name("value"))
                .flatten()
            })
        };

        let b = self.builtins.clone();
        if callee == b.property {
            let fget = match positional.first() {
                Some(arg) => Some(self.eval(*arg, frame)),
                None => keyword("fget").map(|arg| self.eval(arg, frame)),
            };
            let doc = keyword("doc")
                .or_else(|| positional.get(3).copied())
                .and_then(|d| syntax::string_value(d, frame.source));
            let is_abstract = fget.is_some_and(|f| self.is_abstract_callable(f));
            return self.arena.alloc(PyObject::Property(PropertyObject { fget, doc, is_abstract }));
        }
        if callee == b.classmethod || callee == b.staticmethod || callee == b.cached_property {
            if let Some(arg) = positional.first() {
                let inner = self.eval(*arg, frame);
                let wrapped = if callee == b.classmethod {
                    PyObject::ClassMethod(inner)
                } else if callee == b.staticmethod {
                    PyObject::StaticMethod(inner)
                } else {
                    PyObject::CachedProperty(inner)
                };
                return self.arena.alloc(wrapped);
            }
        }
        if callee == b.type_var {
            let name = positional
                .first()
                .and_then(|n| syntax::string_value(*n, frame.source))
                .unwrap_or_else(|| "T".to_string());
            return self.arena.alloc(PyObject::TypeVar {
                name,
                module: frame.module_name.to_string(),
            });
        }

        match self.arena.get(callee) {
            PyObject::Class(class) => {
                let repr = match class.origin {
                    Origin::Source if self.defines_repr(callee) => None,
                    Origin::Source => Some(format!("<{}.{} object>", class.module, class.qualname)),
                    _ => Some(text.to_string()),
                };
                self.arena.alloc(PyObject::Value(ValueObject {
                    class: Some(callee),
                    repr,
                    kind: ValueKind::Instance,
                }))
            }
            _ => self.opaque(text),
        }
    }

    fn defines_repr(&self, class: ObjectId) -> bool {
        self.arena.class(class).is_some_and(|c| {
            c.mro.iter().any(|id| {
                *id != self.builtins.object
                    && self
                        .arena
                        .class(*id)
                        .is_some_and(|k| k.origin == Origin::Source && k.dict.contains_key("__repr__"))
            })
        })
    }

    /// `repr()` of a type expression, e.g. `typing.Generic[~T]` or `dict[str, int]`
    fn type_repr(&mut self, node: Node, frame: Frame) -> String {
        let text = node_text(node, frame.source);
        match node.kind() {
            "identifier" | "attribute" => {
                let id = self.eval(node, frame);
                match self.arena.get(id) {
                    PyObject::Class(c) if c.module == "builtins" => c.qualname.clone(),
                    PyObject::Class(c) => format!("{}.{}", c.module, c.qualname),
                    PyObject::SpecialForm { name, .. } => format!("typing.{}", name),
                    PyObject::TypeVar { name, .. } => format!("~{}", name),
                    PyObject::GenericAlias(alias) => alias.text.clone(),
                    PyObject::Foreign { module, qualname } => format!("{}.{}", module, qualname),
                    _ => text.to_string(),
                }
            }
            "subscript" => {
                let origin = node
                    .child_by_field_name("value")
                    .map(|v| self.type_repr(v, frame))
                    .unwrap_or_default();
                let mut cursor = node.walk();
                let args: Vec<Node> = node.children_by_field_name("subscript", &mut cursor).collect();
                let args: Vec<String> = args.into_iter().map(|a| self.type_repr(a, frame)).collect();
                format!("{}[{}]", origin, args.join(", "))
            }
            "none" => "None".to_string(),
            "list" => {
                let items: Vec<String> = named_elements(node).into_iter().map(|e| self.type_repr(e, frame)).collect();
                format!("[{}]", items.join(", "))
            }
            _ => text.to_string(),
        }
    }

    fn str_value(&mut self, value: &str) -> ObjectId {
        self.arena.alloc(PyObject::Value(ValueObject {
            class: Some(self.builtins.str_),
            repr: Some(python_str_repr(value)),
            kind: ValueKind::Str(value.to_string()),
        }))
    }

    fn str_list(&mut self, names: &[String], tuple: bool) -> ObjectId {
        let items: Vec<String> = names.iter().map(|n| python_str_repr(n)).collect();
        let repr = match (tuple, items.len()) {
            (true, 1) => format!("({},)", items[0]),
            (true, _) => format!("({})", items.join(", ")),
            (false, _) => format!("[{}]", items.join(", ")),
        };
        let class = if tuple { self.builtins.tuple } else { self.builtins.list };
        self.arena.alloc(PyObject::Value(ValueObject {
            class: Some(class),
            repr: Some(repr),
            kind: ValueKind::StrList(names.to_vec()),
        }))
    }

    fn literal(&mut self, class: Option<ObjectId>, text: &str) -> ObjectId {
        self.arena.alloc(PyObject::Value(ValueObject {
            class,
            repr: Some(text.to_string()),
            kind: ValueKind::Literal,
        }))
    }

    /// A value only known by its source text
    fn opaque(&mut self, text: &str) -> ObjectId {
        self.arena.alloc(PyObject::Value(ValueObject {
            class: None,
            repr: Some(text.to_string()),
            kind: ValueKind::Expression,
        }))
    }
}

/// Map a file below a source root to its dotted module name
fn module_name(root: &Path, path: &Path) -> Option<(String, bool)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    let file = parts.pop()?;
    let stem = file.strip_suffix(".py")?;
    let is_package = stem == "__init__";
    if !is_package {
        parts.push(stem.to_string());
    }
    if parts.is_empty() || !parts.iter().all(|p| super::is_identifier(p)) {
        return None;
    }
    Some((parts.join("."), is_package))
}

fn is_formatted(node: Node, source: &str) -> bool {
    let parts = match node.kind() {
        "concatenated_string" => named_elements(node),
        _ => vec![node],
    };
    parts.iter().any(|part| {
        node_text(*part, source)
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .any(|c| c.eq_ignore_ascii_case(&'f'))
    })
}

fn child_blocks(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() == "block")
        .collect()
}

fn named_elements(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn decorator_texts(decorators: &[Node], source: &str) -> Vec<String> {
    decorators
        .iter()
        .map(|d| format!("@{}", node_text(*d, source).trim_start_matches('@').trim()))
        .collect()
}

/// Parameters of a `def` or `lambda` in declaration order
pub(crate) fn parse_parameters(node: Node, source: &str) -> Vec<ParamDecl> {
    let mut params: Vec<ParamDecl> = Vec::new();
    let mut kind = ParamKind::PositionalOrKeyword;

    for child in named_elements(node) {
        let text = |n: Option<Node>| n.map(|n| node_text(n, source).to_string());
        match child.kind() {
            "identifier" => params.push(ParamDecl::new(node_text(child, source), kind)),
            "default_parameter" | "typed_default_parameter" => {
                let Some(name) = text(child.child_by_field_name("name")) else {
                    continue;
                };
                params.push(ParamDecl {
                    name,
                    kind,
                    annotation: text(child.child_by_field_name("type")),
                    default: text(child.child_by_field_name("value")),
                });
            }
            "typed_parameter" => {
                let annotation = text(child.child_by_field_name("type"));
                let Some(inner) = child.named_child(0) else {
                    continue;
                };
                let (name, param_kind) = match inner.kind() {
                    "list_splat_pattern" => {
                        kind = ParamKind::KeywordOnly;
                        (splat_name(inner, source), ParamKind::VarPositional)
                    }
                    "dictionary_splat_pattern" => (splat_name(inner, source), ParamKind::VarKeyword),
                    _ => (node_text(inner, source).to_string(), kind),
                };
                params.push(ParamDecl {
                    name,
                    kind: param_kind,
                    annotation,
                    default: None,
                });
            }
            "list_splat_pattern" => {
                params.push(ParamDecl::new(splat_name(child, source), ParamKind::VarPositional));
                kind = ParamKind::KeywordOnly;
            }
            "dictionary_splat_pattern" => {
                params.push(ParamDecl::new(splat_name(child, source), ParamKind::VarKeyword));
            }
            "keyword_separator" => kind = ParamKind::KeywordOnly,
            "positional_separator" => {
                for param in params.iter_mut() {
                    if param.kind == ParamKind::PositionalOrKeyword {
                        param.kind = ParamKind::PositionalOnly;
                    }
                }
            }
            _ => {}
        }
    }
    params
}

fn splat_name(node: Node, source: &str) -> String {
    node.named_child(0)
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_else(|| node_text(node, source).trim_start_matches('*').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn load(dir: &Path) -> Program {
        Loader::new(LoadOptions::new([dir])).unwrap().run().unwrap()
    }

    #[test]
    fn test_module_names() {
        let root = Path::new("/src");
        assert_eq!(module_name(root, Path::new("/src/pkg/__init__.py")), Some(("pkg".to_string(), true)));
        assert_eq!(module_name(root, Path::new("/src/pkg/sub/mod.py")), Some(("pkg.sub.mod".to_string(), false)));
        assert_eq!(module_name(root, Path::new("/src/not-a-module.py")), None);
    }

    #[test]
    fn test_relative_imports_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pkg/__init__.py", "\"\"\"Package doc.\"\"\"\nfrom .core import Engine\n");
        write(dir.path(), "pkg/core.py", "class Engine:\n    pass\n");

        let program = load(dir.path());
        let pkg = program.module_id("pkg").unwrap();
        let core = program.module_id("pkg.core").unwrap();
        let pkg_module = program.module(pkg).unwrap();

        assert_eq!(pkg_module.doc.as_deref(), Some("Package doc."));
        assert!(pkg_module.package_dir.is_some());
        let engine = pkg_module.dict["Engine"];
        assert_eq!(program.module(core).unwrap().dict["Engine"], engine);
        assert_eq!(pkg_module.dict["core"], core);
    }

    #[test]
    fn test_syntax_errors_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.py", "x = 1\n");
        write(dir.path(), "bad.py", "def broken(:\n");

        let program = load(dir.path());
        assert!(program.module_id("good").is_some());
        assert!(program.module_id("bad").is_none());
        assert!(program.failed_imports().contains_key("bad"));
        assert!(program.import_module("bad").is_err());
    }

    #[test]
    fn test_decorators_wrap_functions() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "m.py",
            r#"
from abc import ABC, abstractmethod
from functools import cached_property

class Shape(ABC):
    @classmethod
    def create(cls): ...

    @staticmethod
    def helper(): ...

    @property
    def area(self) -> float:
        """The area."""

    @area.setter
    def area(self, value): ...

    @cached_property
    def perimeter(self): ...

    @abstractmethod
    def draw(self): ...

    def __new__(cls): ...
"#,
        );

        let program = load(dir.path());
        let m = program.module(program.module_id("m").unwrap()).unwrap();
        let shape = program.class(m.dict["Shape"]).unwrap();

        assert!(matches!(program.object(shape.dict["create"]), PyObject::ClassMethod(_)));
        assert!(matches!(program.object(shape.dict["helper"]), PyObject::StaticMethod(_)));
        assert!(matches!(program.object(shape.dict["perimeter"]), PyObject::CachedProperty(_)));
        assert!(matches!(program.object(shape.dict["__new__"]), PyObject::StaticMethod(_)));
        match program.object(shape.dict["area"]) {
            PyObject::Property(p) => {
                let getter = program.object(p.fget.unwrap()).as_function().unwrap();
                assert_eq!(getter.doc.as_deref(), Some("The area."));
                assert_eq!(getter.returns.as_deref(), Some("float"));
            }
            other => panic!("expected property, got {:?}", other),
        }
        assert!(program.object(shape.dict["draw"]).as_function().unwrap().is_abstract);
        assert_eq!(shape.metaclass, Some(program.builtins().abc_meta));
    }

    #[test]
    fn test_class_dict_layout() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "m.py",
            "class A:\n    \"\"\"Doc.\"\"\"\n    x: int = 1\n\nclass B(A):\n    __slots__ = ('y',)\n",
        );

        let program = load(dir.path());
        let m = program.module(program.module_id("m").unwrap()).unwrap();
        let a = program.class(m.dict["A"]).unwrap();
        let b = program.class(m.dict["B"]).unwrap();

        let keys: Vec<&str> = a.dict.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["__module__", "__doc__", "x", "__annotations__", "__dict__", "__weakref__"]);
        assert_eq!(a.annotations["x"], "int");
        assert!(matches!(program.object(b.dict["y"]), PyObject::MemberDescriptor(_)));
        assert!(!b.dict.contains_key("__dict__"));
        assert_eq!(b.mro.len(), 3);
    }

    #[test]
    fn test_all_and_external_modules() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "m.py",
            "import numpy as np\nfrom os.path import join\n__all__ = ['a']\n__all__ += ['b']\n__all__.append('c')\n",
        );

        let program = load(dir.path());
        let m = program.module(program.module_id("m").unwrap()).unwrap();
        match program.object(m.dict["__all__"]) {
            PyObject::Value(ValueObject {
                kind: ValueKind::StrList(names),
                ..
            }) => assert_eq!(names, &vec!["a".to_string(), "b".to_string(), "c".to_string()]),
            other => panic!("unexpected __all__ {:?}", other),
        }
        assert_eq!(program.module(m.dict["np"]).unwrap().origin, Origin::Foreign);
        assert!(matches!(program.object(m.dict["join"]), PyObject::Foreign { .. }));
    }

    #[test]
    fn test_parameters() {
        let source = "def f(a, b: int, /, c=1, *args, d: str = 'x', **kwargs) -> bool: ...\n";
        let tree = syntax::parse_source(source, "m").unwrap();
        let function = tree.root_node().named_child(0).unwrap();
        let params = parse_parameters(function.child_by_field_name("parameters").unwrap(), source);

        let kinds: Vec<(&str, ParamKind)> = params.iter().map(|p| (p.name.as_str(), p.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a", ParamKind::PositionalOnly),
                ("b", ParamKind::PositionalOnly),
                ("c", ParamKind::PositionalOrKeyword),
                ("args", ParamKind::VarPositional),
                ("d", ParamKind::KeywordOnly),
                ("kwargs", ParamKind::VarKeyword),
            ]
        );
        assert_eq!(params[1].annotation.as_deref(), Some("int"));
        assert_eq!(params[4].default.as_deref(), Some("'x'"));
    }
}
