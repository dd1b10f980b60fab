// src/core/report.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::{Doc, Namespace};

/// Documentation of one root namespace, ready to be printed or serialized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocReport {
    pub generated_at: DateTime<Utc>,

    /// Parser suite that produced the tree
    pub parser_suite: String,

    pub root: DocEntry,
}

/// Where a member was originally declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakenFrom {
    pub module: String,
    pub qualname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub kind: String,
    pub fullname: String,
    pub taken_from: TakenFrom,
    pub is_inherited: bool,
    pub docstring: String,

    /// Variable annotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,

    /// Representation of a variable's value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Signature of functions and class constructors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocEntry>,
}

impl DocReport {
    pub fn new(parser_suite: impl Into<String>, root: &Doc, include_private: bool) -> Self {
        Self {
            generated_at: Utc::now(),
            parser_suite: parser_suite.into(),
            root: DocEntry::from_doc(root, include_private),
        }
    }

    /// Number of entries in the tree, the root included
    pub fn entry_count(&self) -> usize {
        self.root.count()
    }
}

/// Underscore names are private, except constructors
fn is_public(name: &str) -> bool {
    !name.starts_with('_') || name == "__init__"
}

impl DocEntry {
    pub fn from_doc(doc: &Doc, include_private: bool) -> Self {
        let (module, qualname) = doc.taken_from().clone();
        let mut entry = Self {
            kind: doc.kind().to_string(),
            fullname: doc.fullname().to_string(),
            taken_from: TakenFrom { module, qualname },
            is_inherited: doc.is_inherited(),
            docstring: doc.docstring().to_string(),
            annotation: None,
            default: None,
            signature: None,
            bases: Vec::new(),
            children: Vec::new(),
        };

        let keep = |member: &&Doc| include_private || is_public(member.name());
        match doc {
            Doc::Module(module) => {
                entry.children = module
                    .members()
                    .values()
                    .filter(keep)
                    .map(|member| Self::from_doc(member, include_private))
                    .collect();
                for submodule in module.submodules() {
                    let submodule = Doc::Module(submodule.clone());
                    if keep(&&submodule) {
                        entry.children.push(Self::from_doc(&submodule, include_private));
                    }
                }
            }
            Doc::Class(class) => {
                entry.signature = Some(class.signature().to_string());
                entry.bases = class.bases().iter().map(|base| base.display.clone()).collect();
                entry.children = class
                    .members()
                    .values()
                    .filter(keep)
                    .map(|member| Self::from_doc(member, include_private))
                    .collect();
            }
            Doc::Function(function) => {
                entry.signature = Some(function.signature().to_string());
            }
            Doc::Variable(variable) => {
                entry.annotation = variable.annotation.format(None);
                entry.default = variable
                    .default_value_str()
                    .strip_prefix(" = ")
                    .map(str::to_string);
            }
        }
        entry
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(DocEntry::count).sum::<usize>()
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{}{} {}", indent, self.kind, self.fullname)?;
        if let Some(signature) = &self.signature {
            write!(f, "{}", signature)?;
        }
        if !self.bases.is_empty() {
            write!(f, " [{}]", self.bases.join(", "))?;
        }
        if let Some(annotation) = &self.annotation {
            write!(f, ": {}", annotation)?;
        }
        if let Some(default) = &self.default {
            write!(f, " = {}", default)?;
        }
        if self.is_inherited {
            write!(f, " (from {}.{})", self.taken_from.module, self.taken_from.qualname)?;
        }
        writeln!(f)?;
        if let Some(summary) = self.docstring.lines().next().filter(|line| !line.is_empty()) {
            writeln!(f, "{}  {}", indent, summary)?;
        }
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for DocEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{SourceCodeOptions, SourceCodeParserSuite};
    use crate::core::program::{LoadOptions, Program};
    use std::fs;

    const SOURCE: &str = r#"
"""Shapes."""

#: Default side length.
SIDE: int = 2

#: Internal cache.
_cache = {}


class Square:
    """A square."""

    def __init__(self, side: int = 2) -> None:
        self.side = side  #: Length of one side.

    def area(self) -> int:
        """Area of the square."""

    def _scale(self, factor):
        pass
"#;

    fn report(include_private: bool) -> DocReport {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shapes.py"), SOURCE).unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        let suite = SourceCodeParserSuite::new(program, SourceCodeOptions::default());
        let module = suite.module("shapes").unwrap();
        DocReport::new("SourceCode", &Doc::Module(module), include_private)
    }

    #[test]
    fn test_report_tree() {
        let report = report(false);
        let root = &report.root;
        assert_eq!(root.kind, "module");
        assert_eq!(root.docstring, "Shapes.");

        let names: Vec<&str> = root.children.iter().map(|c| c.fullname.as_str()).collect();
        assert_eq!(names, ["shapes.SIDE", "shapes.Square"]);

        let side = &root.children[0];
        assert_eq!(side.annotation.as_deref(), Some("int"));
        assert_eq!(side.default.as_deref(), Some("2"));
        assert_eq!(side.docstring, "Default side length.");

        let square = &root.children[1];
        assert_eq!(square.signature.as_deref(), Some("(self, side: int = 2)"));
        let members: Vec<&str> = square.children.iter().map(|c| c.fullname.as_str()).collect();
        assert!(members.contains(&"shapes.Square.__init__"));
        assert!(members.contains(&"shapes.Square.area"));
        assert!(members.contains(&"shapes.Square.side"));
        assert!(!members.contains(&"shapes.Square._scale"));
    }

    #[test]
    fn test_private_members_on_request() {
        let report = report(true);
        assert!(report.root.children.iter().any(|c| c.fullname == "shapes._cache"));
        assert!(report.entry_count() > 5);
    }

    #[test]
    fn test_text_and_json_output() {
        let report = report(false);
        let text = report.root.to_string();
        assert!(text.starts_with("module shapes\n  Shapes.\n"));
        assert!(text.contains("  variable shapes.SIDE: int = 2\n"));
        assert!(text.contains("    function shapes.Square.area(self) -> int\n      Area of the square.\n"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["parser_suite"], "SourceCode");
        assert_eq!(json["root"]["children"][0]["taken_from"]["qualname"], "SIDE");
        assert!(json["root"]["children"][0].get("signature").is_none());

        let parsed: DocReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.entry_count(), report.entry_count());
    }
}
