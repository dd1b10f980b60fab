//! Callable signatures with resolved annotations.

use std::fmt;

use crate::core::annotations::{self, Annotation};
use crate::core::inspect::strip_addresses;
use crate::core::program::{ParamDecl, ParamKind, PyObject, PyRef};
use crate::core::syntax::literal_repr;

/// Signatures whose rendering exceeds this width get one parameter per line
const MULTILINE_CUTOFF: usize = 70;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Annotation,
    /// `repr()` of the default value
    pub default: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            annotation: Annotation::Empty,
            default: None,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::VarPositional => f.write_str("*")?,
            ParamKind::VarKeyword => f.write_str("**")?,
            _ => {}
        }
        f.write_str(&self.name)?;
        if let Some(annotation) = self.annotation.format(None) {
            write!(f, ": {}", annotation)?;
        }
        if let Some(default) = &self.default {
            if self.annotation.is_empty() {
                write!(f, "={}", default)?;
            } else {
                write!(f, " = {}", default)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub parameters: Vec<Parameter>,
    pub return_annotation: Annotation,
}

impl Signature {
    /// `()`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stand-in for callables whose parameters cannot be determined
    pub fn placeholder() -> Self {
        Self {
            parameters: vec![Parameter::new("unknown", ParamKind::PositionalOrKeyword)],
            return_annotation: Annotation::Empty,
        }
    }

    /// Build a signature from declared parameters, resolving annotations in the
    /// namespace of `context`
    pub fn from_decls(decls: &[ParamDecl], returns: Option<&str>, context: &PyRef, fullname: &str) -> Self {
        let resolve = |text: &str| Annotation::Type(annotations::resolve(text, context, fullname));
        Self {
            parameters: decls
                .iter()
                .map(|decl| Parameter {
                    name: decl.name.clone(),
                    kind: decl.kind,
                    annotation: decl.annotation.as_deref().map(resolve).unwrap_or_default(),
                    default: decl.default.as_deref().map(literal_repr),
                })
                .collect(),
            return_annotation: returns.map(resolve).unwrap_or_default(),
        }
    }

    /// Signature of a callable object; the placeholder when it has none
    pub fn of(callable: &PyRef, fullname: &str) -> Self {
        match callable.object() {
            PyObject::Function(function) => {
                Self::from_decls(&function.parameters, function.returns.as_deref(), callable, fullname)
            }
            PyObject::Builtin(builtin) => match &builtin.parameters {
                Some(parameters) => Self::from_decls(parameters, None, callable, fullname),
                None => Self::placeholder(),
            },
            PyObject::ClassMethod(inner) | PyObject::StaticMethod(inner) => Self::of(&callable.sibling(*inner), fullname),
            _ => Self::placeholder(),
        }
    }

    pub fn without_return(mut self) -> Self {
        self.return_annotation = Annotation::Empty;
        self
    }

    /// The signature with its first parameter (`self` / `cls`) removed
    pub fn without_first(&self) -> Self {
        Self {
            parameters: self.parameters.iter().skip(1).cloned().collect(),
            return_annotation: self.return_annotation.clone(),
        }
    }

    /// Rendered parameters, with `/` and `*` separators where the kinds require them
    pub fn params(&self) -> Vec<String> {
        let mut result = Vec::with_capacity(self.parameters.len() + 2);
        let mut pending_positional_only = false;
        let mut needs_keyword_separator = true;

        for param in &self.parameters {
            let formatted = strip_addresses(&param.to_string());
            if param.kind == ParamKind::PositionalOnly {
                pending_positional_only = true;
            } else if pending_positional_only {
                result.push("/".to_string());
                pending_positional_only = false;
            }

            if param.kind == ParamKind::VarPositional {
                needs_keyword_separator = false;
            } else if param.kind == ParamKind::KeywordOnly && needs_keyword_separator {
                result.push("*".to_string());
                needs_keyword_separator = false;
            }
            result.push(formatted);
        }
        if pending_positional_only {
            result.push("/".to_string());
        }
        result
    }

    pub fn return_annotation_str(&self) -> String {
        self.return_annotation.format(None).unwrap_or_default()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self.params();
        let returns = self.return_annotation_str();
        let total: usize = params.iter().map(|p| p.chars().count() + 2).sum::<usize>() + returns.chars().count();

        if total > MULTILINE_CUTOFF {
            write!(f, "(\n    {}\n)", params.join(",\n    "))?;
        } else {
            write!(f, "({})", params.join(", "))?;
        }
        if !returns.is_empty() {
            write!(f, " -> {}", returns)?;
        }
        Ok(())
    }
}
