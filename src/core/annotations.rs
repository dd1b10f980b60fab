//! Resolution of textual type annotations against the loaded program, and
//! their display in the style of `inspect.formatannotation`.

use indexmap::IndexMap;
use std::fmt;
use tracing::warn;
use tree_sitter::Node;

use crate::core::inspect::{self, safe_getattr};
use crate::core::program::{PyObject, PyRef, ValueKind, ValueObject};
use crate::core::syntax::{self, node_text, python_str_repr};

/// A type expression whose names have been looked up in the program
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A class, typing construct, type variable or alias
    Object(PyRef),
    /// A name inside a module that was not loaded, e.g. `numpy.ndarray`
    Foreign { module: String, qualname: String },
    /// `origin[args]`
    Generic { origin: Box<TypeExpr>, args: Vec<TypeExpr> },
    /// `X | Y`
    Union(Vec<TypeExpr>),
    /// `[A, B]`, the argument list of `Callable`
    List(Vec<TypeExpr>),
    NoneType,
    /// Literal arguments such as `...` or `'r'` in `Literal['r']`
    Literal(String),
    /// Annotation text that could not be resolved
    Text(String),
}

impl TypeExpr {
    /// `__module__` of the resolved expression
    pub fn module(&self) -> Option<String> {
        match self {
            Self::Object(obj) => inspect::object_module(obj),
            Self::Foreign { module, .. } => Some(module.clone()),
            Self::Generic { origin, .. } => origin.module(),
            Self::Union(_) => Some("types".to_string()),
            _ => None,
        }
    }

    /// `repr()` of the expression
    pub fn repr(&self) -> String {
        match self {
            Self::Object(obj) => match obj.object() {
                PyObject::Class(class) if class.module == "builtins" => class.qualname.clone(),
                PyObject::Class(class) => format!("{}.{}", class.module, class.qualname),
                PyObject::Foreign { module, qualname } => format!("{}.{}", module, qualname),
                _ => inspect::object_repr(obj),
            },
            Self::Foreign { module, qualname } => format!("{}.{}", module, qualname),
            Self::Generic { origin, args } if args.is_empty() => format!("{}[()]", origin.repr()),
            Self::Generic { origin, args } => format!("{}[{}]", origin.repr(), join(args, ", ")),
            Self::Union(members) => join(members, " | "),
            Self::List(items) => format!("[{}]", join(items, ", ")),
            Self::NoneType => "None".to_string(),
            Self::Literal(text) => text.clone(),
            Self::Text(text) => python_str_repr(text),
        }
    }

    /// Display the expression the way `inspect.formatannotation` does,
    /// dropping the module of classes declared in `base_module`
    pub fn format(&self, base_module: Option<&str>) -> String {
        if self.module().as_deref() == Some("typing") {
            return self.repr().replace("typing.", "");
        }
        match self {
            Self::Object(obj) => match obj.object() {
                PyObject::Class(class) if class.module == "builtins" || Some(class.module.as_str()) == base_module => {
                    class.qualname.clone()
                }
                _ => self.repr(),
            },
            _ => self.repr(),
        }
    }

    /// The outer generic origin, e.g. `ClassVar` for `ClassVar[int]`
    pub fn origin(&self) -> Option<&TypeExpr> {
        match self {
            Self::Generic { origin, .. } => Some(origin),
            _ => None,
        }
    }

    pub fn is_classvar(&self) -> bool {
        match self.origin() {
            Some(Self::Object(origin)) => origin.id() == origin.program().builtins().class_var,
            _ => false,
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(None))
    }
}

fn join(items: &[TypeExpr], separator: &str) -> String {
    items.iter().map(TypeExpr::repr).collect::<Vec<_>>().join(separator)
}

/// A variable or parameter annotation; `Empty` when none was written
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Annotation {
    #[default]
    Empty,
    Type(TypeExpr),
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_type(&self) -> Option<&TypeExpr> {
        match self {
            Self::Empty => None,
            Self::Type(expr) => Some(expr),
        }
    }

    pub fn format(&self, base_module: Option<&str>) -> Option<String> {
        self.as_type().map(|expr| expr.format(base_module))
    }
}

impl From<TypeExpr> for Annotation {
    fn from(expr: TypeExpr) -> Self {
        Self::Type(expr)
    }
}

/// Resolve annotation text in the namespace of `context`.
///
/// Names are looked up in the class dict when `context` is a class, then in the
/// globals of its module, then in `builtins`. Text that does not resolve is kept
/// as [`TypeExpr::Text`] with a warning naming `fullname`.
pub fn resolve(text: &str, context: &PyRef, fullname: &str) -> TypeExpr {
    match try_resolve(text, context) {
        Some(expr) => expr,
        None => {
            warn!("Error parsing type annotation {} for {}", text, fullname);
            TypeExpr::Text(text.to_string())
        }
    }
}

/// Resolve every entry of a name -> annotation text table
pub fn resolve_all(annotations: &IndexMap<String, String>, context: &PyRef, fullname: &str) -> IndexMap<String, TypeExpr> {
    annotations
        .iter()
        .map(|(name, text)| (name.clone(), resolve(text, context, &format!("{}.{}", fullname, name))))
        .collect()
}

fn try_resolve(text: &str, context: &PyRef) -> Option<TypeExpr> {
    let source = text.trim();
    let tree = syntax::parse_source(source, "<annotation>").ok()?;
    let statements = syntax::statements(tree.root_node());
    let [statement] = statements.as_slice() else {
        return None;
    };
    if statement.kind() != "expression_statement" || statement.named_child_count() != 1 {
        return None;
    }
    let resolver = Resolver { source, context };
    resolver.eval(statement.named_child(0)?)
}

struct Resolver<'a> {
    source: &'a str,
    context: &'a PyRef,
}

impl Resolver<'_> {
    fn eval(&self, node: Node) -> Option<TypeExpr> {
        let text = node_text(node, self.source);
        match node.kind() {
            "identifier" => self.lookup(text).and_then(object_expr),
            "none" => Some(TypeExpr::NoneType),
            "attribute" => {
                let owner = self.eval(node.child_by_field_name("object")?)?;
                let attr = node_text(node.child_by_field_name("attribute")?, self.source);
                self.attribute(owner, attr)
            }
            "subscript" => {
                let origin = self.eval(node.child_by_field_name("value")?)?;
                let literal_args = matches!(
                    &origin,
                    TypeExpr::Object(obj) if matches!(
                        obj.object(),
                        PyObject::SpecialForm { name, .. } if name == "Literal"
                    )
                );
                let mut cursor = node.walk();
                let args: Vec<Node> = node.children_by_field_name("subscript", &mut cursor).collect();
                let args = args
                    .into_iter()
                    .map(|arg| {
                        if literal_args {
                            Some(TypeExpr::Literal(node_text(arg, self.source).to_string()))
                        } else {
                            self.eval(arg)
                        }
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(TypeExpr::Generic {
                    origin: Box::new(origin),
                    args,
                })
            }
            // forward reference
            "string" => {
                let inner = syntax::string_value(node, self.source)?;
                try_resolve(&inner, self.context)
            }
            "list" => {
                let mut cursor = node.walk();
                let items: Vec<Node> = node.named_children(&mut cursor).collect();
                items
                    .into_iter()
                    .map(|item| self.eval(item))
                    .collect::<Option<Vec<_>>>()
                    .map(TypeExpr::List)
            }
            "binary_operator" => {
                let operator = node.child_by_field_name("operator").map(|o| node_text(o, self.source));
                if operator != Some("|") {
                    return None;
                }
                let mut members = Vec::new();
                for side in ["left", "right"] {
                    match self.eval(node.child_by_field_name(side)?)? {
                        TypeExpr::Union(inner) => members.extend(inner),
                        other => members.push(other),
                    }
                }
                Some(TypeExpr::Union(members))
            }
            "parenthesized_expression" => self.eval(node.named_child(0)?),
            "ellipsis" => Some(TypeExpr::Literal("...".to_string())),
            "integer" | "float" | "true" | "false" => Some(TypeExpr::Literal(text.to_string())),
            _ => None,
        }
    }

    fn lookup(&self, name: &str) -> Option<PyRef> {
        let program = self.context.program();
        if let Some(class) = self.context.object().as_class() {
            if let Some(id) = class.dict.get(name) {
                return Some(self.context.sibling(*id));
            }
        }
        let module = match self.context.object() {
            PyObject::Module(_) => Some(self.context.clone()),
            _ => inspect::object_module(self.context)
                .and_then(|m| program.module_id(&m))
                .map(|id| self.context.sibling(id)),
        };
        if let Some(found) = module.and_then(|m| m.object().as_module()?.dict.get(name).map(|id| m.sibling(*id))) {
            return Some(found);
        }
        let builtins = self.context.sibling(program.builtins().builtins_module);
        safe_getattr(&builtins, name)
    }

    fn attribute(&self, owner: TypeExpr, attr: &str) -> Option<TypeExpr> {
        match owner {
            TypeExpr::Object(obj) => {
                if let Some(found) = safe_getattr(&obj, attr) {
                    return object_expr(found);
                }
                match obj.object() {
                    PyObject::Module(module) if module.source.is_none() => Some(TypeExpr::Foreign {
                        module: module.name.clone(),
                        qualname: attr.to_string(),
                    }),
                    PyObject::Foreign { module, qualname } => Some(TypeExpr::Foreign {
                        module: module.clone(),
                        qualname: format!("{}.{}", qualname, attr),
                    }),
                    _ => None,
                }
            }
            TypeExpr::Foreign { module, qualname } => Some(TypeExpr::Foreign {
                module,
                qualname: format!("{}.{}", qualname, attr),
            }),
            _ => None,
        }
    }
}

fn object_expr(obj: PyRef) -> Option<TypeExpr> {
    match obj.object() {
        _ if inspect::is_none(&obj) => Some(TypeExpr::NoneType),
        // names the loader could only keep as source text
        PyObject::Value(ValueObject {
            kind: ValueKind::Expression,
            ..
        }) => None,
        PyObject::Foreign { module, qualname } => Some(TypeExpr::Foreign {
            module: module.clone(),
            qualname: qualname.clone(),
        }),
        _ => Some(TypeExpr::Object(obj)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::program::{LoadOptions, Program};
    use std::fs;
    use std::rc::Rc;

    const SOURCE: &str = r#"from typing import ClassVar, Dict, List, Optional, Literal, Callable
import numpy as np

class Inner:
    pass

class Holder:
    Alias = Inner
"#;

    fn load() -> (tempfile::TempDir, Rc<Program>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m.py"), SOURCE).unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        (dir, program)
    }

    fn module(program: &Rc<Program>) -> PyRef {
        PyRef::new(program.clone(), program.module_id("m").unwrap())
    }

    fn shown(text: &str, context: &PyRef) -> String {
        resolve(text, context, "m.test").format(Some("m"))
    }

    #[test]
    fn test_builtin_and_local_names() {
        let (_dir, program) = load();
        let m = module(&program);
        assert_eq!(shown("float", &m), "float");
        assert_eq!(shown("Inner", &m), "Inner");
        assert_eq!(resolve("Inner", &m, "m.x").format(None), "m.Inner");
        assert_eq!(shown("None", &m), "None");
        assert_eq!(shown("'Inner'", &m), "Inner");
    }

    #[test]
    fn test_typing_constructs() {
        let (_dir, program) = load();
        let m = module(&program);
        assert_eq!(shown("Dict[str, int]", &m), "Dict[str, int]");
        assert_eq!(shown("Optional[Inner]", &m), "Optional[m.Inner]");
        assert_eq!(shown("Literal['r', 'w']", &m), "Literal['r', 'w']");
        assert_eq!(shown("Callable[[int], str]", &m), "Callable[[int], str]");
        assert_eq!(shown("Callable[..., int]", &m), "Callable[..., int]");
        assert_eq!(shown("list[int]", &m), "list[int]");
        assert_eq!(shown("int | None", &m), "int | None");
    }

    #[test]
    fn test_classvar_detection() {
        let (_dir, program) = load();
        let m = module(&program);
        assert!(resolve("ClassVar[int]", &m, "m.x").is_classvar());
        assert!(!resolve("List[int]", &m, "m.x").is_classvar());
        assert!(!resolve("int", &m, "m.x").is_classvar());
    }

    #[test]
    fn test_class_namespace_is_searched_first() {
        let (_dir, program) = load();
        let m = module(&program);
        let holder = safe_getattr(&m, "Holder").unwrap();
        assert_eq!(shown("Alias", &holder), "Inner");
        assert_eq!(resolve("Alias", &m, "m.x"), TypeExpr::Text("Alias".to_string()));
    }

    #[test]
    fn test_foreign_and_unresolvable_names() {
        let (_dir, program) = load();
        let m = module(&program);
        assert_eq!(shown("np.ndarray", &m), "numpy.ndarray");
        let unresolved = resolve("Missing[int]", &m, "m.x");
        assert_eq!(unresolved, TypeExpr::Text("Missing[int]".to_string()));
        assert_eq!(unresolved.format(None), "'Missing[int]'");
    }

    #[test]
    fn test_annotation_sentinel() {
        let (_dir, program) = load();
        let m = module(&program);
        assert!(Annotation::default().is_empty());
        assert_eq!(Annotation::default().format(None), None);
        let annotation = Annotation::from(resolve("float", &m, "m.x"));
        assert_eq!(annotation.format(None).as_deref(), Some("float"));
    }
}
