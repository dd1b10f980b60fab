//! Picks up variable doc comments and annotations per lexical namespace.
//!
//! Three documentation forms are recognised for an assignment, the later ones
//! taking precedence within one statement:
//!
//! ```python
//! #: comment lines right above
//! x = 1  #: comment after the assignment
//! x = 1
//! """string literal right below"""
//! ```

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use tree_sitter::Node;

use crate::config::DuplicatePolicy;
use crate::core::inspect::cleandoc;
use crate::core::program::SourceEncoding;
use crate::core::syntax::{self, node_text};
use crate::error::Result;

type Key = (String, String);

#[derive(Debug, Default, Clone, PartialEq)]
struct ScanTables {
    annotations: IndexMap<Key, String>,
    docstrings: IndexMap<Key, String>,
}

/// Scope a statement is scanned in
#[derive(Clone, Copy)]
struct Scope<'s> {
    namespace: &'s str,
    /// First parameter of the enclosing constructor
    receiver: Option<&'s str>,
}

#[derive(Debug)]
pub struct VariableScanner {
    code: String,
    encoding: SourceEncoding,
    origin: String,
    policy: DuplicatePolicy,
    tables: OnceCell<ScanTables>,
}

impl PartialEq for VariableScanner {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.encoding == other.encoding
    }
}

impl VariableScanner {
    pub fn new(code: impl Into<String>, encoding: SourceEncoding) -> Self {
        Self {
            code: code.into(),
            encoding,
            origin: "<unknown>".to_string(),
            policy: DuplicatePolicy::default(),
            tables: OnceCell::new(),
        }
    }

    /// Decode raw source bytes before scanning
    pub fn from_bytes(bytes: &[u8], encoding: SourceEncoding, origin: &str) -> Result<Self> {
        let code = encoding.decode(bytes, origin)?;
        Ok(Self::new(code, encoding).with_origin(origin))
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    /// Scan the source once; later calls reuse the first result
    pub fn parse(&self) -> Result<()> {
        self.tables()?;
        Ok(())
    }

    fn tables(&self) -> Result<&ScanTables> {
        self.tables.get_or_try_init(|| {
            let tree = syntax::parse_source(&self.code, &self.origin)?;
            let mut walker = Walker {
                source: &self.code,
                lines: self.code.lines().collect(),
                policy: self.policy,
                tables: ScanTables::default(),
            };
            walker.scan_block(tree.root_node(), Scope { namespace: "", receiver: None });
            Ok(walker.tables)
        })
    }

    /// Annotation texts of the names declared in `namespace` (`""` for the top level)
    pub fn annotations_in_namespace(&self, namespace: &str) -> Result<IndexMap<String, String>> {
        Ok(in_namespace(&self.tables()?.annotations, namespace))
    }

    /// Doc comments and docstrings of the names declared in `namespace`
    pub fn docstrings_in_namespace(&self, namespace: &str) -> Result<IndexMap<String, String>> {
        Ok(in_namespace(&self.tables()?.docstrings, namespace))
    }
}

fn in_namespace(table: &IndexMap<Key, String>, namespace: &str) -> IndexMap<String, String> {
    table
        .iter()
        .filter(|((ns, _), _)| ns == namespace)
        .map(|((_, name), value)| (name.clone(), value.clone()))
        .collect()
}

struct Walker<'s> {
    source: &'s str,
    lines: Vec<&'s str>,
    policy: DuplicatePolicy,
    tables: ScanTables,
}

impl<'s> Walker<'s> {
    fn scan_block(&mut self, block: Node, scope: Scope) {
        let statements = syntax::statements(block);
        for (i, stmt) in statements.iter().enumerate() {
            self.scan_statement(*stmt, statements.get(i + 1).copied(), scope);
        }
    }

    fn scan_statement(&mut self, stmt: Node, next: Option<Node>, scope: Scope) {
        match stmt.kind() {
            "expression_statement" => {
                let Some(expr) = stmt.named_child(0) else {
                    return;
                };
                if expr.kind() == "assignment" {
                    self.scan_assignment(stmt, expr, next, scope);
                }
            }
            "class_definition" if scope.receiver.is_none() => self.scan_class(stmt, scope),
            "function_definition" if scope.receiver.is_none() => self.scan_function(stmt, scope),
            "decorated_definition" if scope.receiver.is_none() => {
                if let Some(definition) = stmt.child_by_field_name("definition") {
                    self.scan_statement(definition, next, scope);
                }
            }
            "if_statement" | "try_statement" | "with_statement" | "for_statement" | "while_statement" => {
                for block in nested_blocks(stmt) {
                    self.scan_block(block, scope);
                }
            }
            _ => {}
        }
    }

    fn scan_class(&mut self, class: Node, scope: Scope) {
        let (Some(name), Some(body)) = (class.child_by_field_name("name"), class.child_by_field_name("body")) else {
            return;
        };
        let name = node_text(name, self.source);
        let namespace = if scope.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope.namespace, name)
        };
        self.scan_block(body, Scope { namespace: &namespace, receiver: None });
    }

    fn scan_function(&mut self, function: Node, scope: Scope) {
        if scope.namespace.is_empty() {
            return;
        }
        let name = function.child_by_field_name("name").map(|n| node_text(n, self.source));
        if name != Some("__init__") {
            return;
        }
        let receiver = function
            .child_by_field_name("parameters")
            .and_then(|params| first_parameter(params, self.source));
        let (Some(receiver), Some(body)) = (receiver, function.child_by_field_name("body")) else {
            return;
        };
        self.scan_block(
            body,
            Scope {
                namespace: scope.namespace,
                receiver: Some(receiver),
            },
        );
    }

    fn scan_assignment(&mut self, stmt: Node, assignment: Node, next: Option<Node>, scope: Scope) {
        let mut names = Vec::new();
        let mut current = assignment;
        loop {
            if let Some(left) = current.child_by_field_name("left") {
                self.target_names(left, scope, &mut names);
            }
            match current.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => current = right,
                _ => break,
            }
        }
        if names.is_empty() {
            return;
        }

        let annotation = assignment
            .child_by_field_name("type")
            .map(|t| normalize_annotation(node_text(t, self.source)))
            .or_else(|| self.type_comment(stmt));
        if let Some(annotation) = annotation {
            for name in &names {
                self.record_annotation(scope.namespace, name, &annotation);
            }
        }

        let docstring = next
            .and_then(|n| syntax::docstring_statement(n, self.source))
            .map(|doc| cleandoc(&doc))
            .or_else(|| self.comment_after(stmt))
            .or_else(|| self.comments_before(stmt));
        if let Some(docstring) = docstring {
            for name in &names {
                self.record_docstring(scope.namespace, name, &docstring);
            }
        }
    }

    fn target_names(&self, target: Node, scope: Scope, names: &mut Vec<String>) {
        match target.kind() {
            "identifier" if scope.receiver.is_none() => names.push(node_text(target, self.source).to_string()),
            "attribute" => {
                let (Some(object), Some(attr)) = (target.child_by_field_name("object"), target.child_by_field_name("attribute"))
                else {
                    return;
                };
                if scope.receiver.is_some_and(|r| node_text(object, self.source) == r) {
                    names.push(node_text(attr, self.source).to_string());
                }
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list" | "list_splat_pattern"
            | "parenthesized_expression" => {
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.target_names(child, scope, names);
                }
            }
            _ => {}
        }
    }

    /// `#:` comment following the statement on its last line
    fn comment_after(&self, stmt: Node) -> Option<String> {
        let end = stmt.end_position();
        let rest = self.lines.get(end.row)?.get(end.column..)?;
        doc_comment(rest).map(str::to_string)
    }

    /// Consecutive `#:` lines right above the statement
    fn comments_before(&self, stmt: Node) -> Option<String> {
        let start = stmt.start_position();
        let line = self.lines.get(start.row)?;
        if !line.get(..start.column)?.trim().is_empty() {
            return None;
        }

        let mut collected = Vec::new();
        for row in (0..start.row).rev() {
            match doc_comment(self.lines[row]) {
                Some(text) => collected.push(text),
                None => break,
            }
        }
        if collected.is_empty() {
            return None;
        }
        collected.reverse();
        Some(cleandoc(&collected.join("\n")))
    }

    /// `# type: T` comment on the assignment line
    fn type_comment(&self, stmt: Node) -> Option<String> {
        let end = stmt.end_position();
        let rest = self.lines.get(end.row)?.get(end.column..)?.trim();
        let annotation = rest.strip_prefix('#')?.trim_start().strip_prefix("type:")?.trim();
        if annotation.is_empty() || annotation.starts_with("ignore") {
            return None;
        }
        Some(normalize_annotation(annotation))
    }

    fn record_annotation(&mut self, namespace: &str, name: &str, annotation: &str) {
        record(&mut self.tables.annotations, self.policy, namespace, name, annotation);
    }

    fn record_docstring(&mut self, namespace: &str, name: &str, docstring: &str) {
        record(&mut self.tables.docstrings, self.policy, namespace, name, docstring);
    }
}

fn record(table: &mut IndexMap<Key, String>, policy: DuplicatePolicy, namespace: &str, name: &str, value: &str) {
    let key = (namespace.to_string(), name.to_string());
    match policy {
        DuplicatePolicy::FirstWins => {
            table.entry(key).or_insert_with(|| value.to_string());
        }
        DuplicatePolicy::LastWins => {
            table.insert(key, value.to_string());
        }
    }
}

/// Text of a `#:` comment line, with one leading space removed
fn doc_comment(line: &str) -> Option<&str> {
    let text = line.trim_start().strip_prefix("#:")?;
    let text = text.strip_prefix(' ').unwrap_or(text);
    Some(text.trim_end_matches(['\r', '\n']))
}

fn normalize_annotation(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").replace("[ ", "[").replace(" ]", "]")
}

fn first_parameter<'s>(params: Node, source: &'s str) -> Option<&'s str> {
    let mut cursor = params.walk();
    let first = params.named_children(&mut cursor).find(|p| p.kind() != "comment")?;
    match first.kind() {
        "identifier" => Some(node_text(first, source)),
        "typed_parameter" => first.named_child(0).map(|n| node_text(n, source)),
        "default_parameter" | "typed_default_parameter" => first.child_by_field_name("name").map(|n| node_text(n, source)),
        _ => None,
    }
}

/// Statement blocks nested in a compound statement, in source order
fn nested_blocks(stmt: Node) -> Vec<Node> {
    let mut blocks = Vec::new();
    let mut cursor = stmt.walk();
    for child in stmt.named_children(&mut cursor) {
        match child.kind() {
            "block" => blocks.push(child),
            "elif_clause" | "else_clause" | "except_clause" | "except_group_clause" | "finally_clause" => {
                blocks.extend(nested_blocks(child));
            }
            _ => {}
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Sample module."""

class ClassA(object):
    """A class docstring"""
    attr0: str  # only type annotations
    attr1 = 'attr1_v'  #: doc comment after assignment

    def __init__(self, attr):
        #: doc comment before assignment
        self.attr2 = attr
        self.attr3: float = 3
        """attribute docstring"""
        self.attr4: str = 'attr4_v'
        """
            attribute multiple
            line docstring
        """
        local = 1  #: not an attribute

    def update_attr3(self, new):
        self.attr3 = new  #: not in the constructor

    class ClassC:
        attr1: None = None  #: nested class attributes comment


#: doc comment before assignment first line
#: doc comment before assignment second line
instance_of_a: ClassA = ClassA('sample_instance')

var1: float = 3.1415925  #: doc comment after assignment
var3: int = 3
"""variable docstring"""
var5 = {'k': 'v'}
"the string followed by a attribute"
a, b = 1, 2  #: tuple doc
counter = 0  # type: int
"#;

    fn scanner() -> VariableScanner {
        VariableScanner::new(SAMPLE, SourceEncoding::Utf8)
    }

    #[test]
    fn test_module_namespace() {
        let scanner = scanner();
        let docs = scanner.docstrings_in_namespace("").unwrap();
        assert_eq!(
            docs["instance_of_a"],
            "doc comment before assignment first line\ndoc comment before assignment second line"
        );
        assert_eq!(docs["var1"], "doc comment after assignment");
        assert_eq!(docs["var3"], "variable docstring");
        assert_eq!(docs["var5"], "the string followed by a attribute");
        assert_eq!(docs["a"], "tuple doc");
        assert_eq!(docs["b"], "tuple doc");

        let annotations = scanner.annotations_in_namespace("").unwrap();
        let names: Vec<&str> = annotations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["instance_of_a", "var1", "var3", "counter"]);
        assert_eq!(annotations["counter"], "int");
    }

    #[test]
    fn test_class_and_constructor_namespace() {
        let scanner = scanner();
        let docs = scanner.docstrings_in_namespace("ClassA").unwrap();
        assert_eq!(docs["attr1"], "doc comment after assignment");
        assert_eq!(docs["attr2"], "doc comment before assignment");
        assert_eq!(docs["attr3"], "attribute docstring");
        assert_eq!(docs["attr4"], "attribute multiple\nline docstring");
        assert!(!docs.contains_key("local"));
        assert!(!docs.contains_key("attr0"));

        let annotations = scanner.annotations_in_namespace("ClassA").unwrap();
        assert_eq!(annotations["attr0"], "str");
        assert_eq!(annotations["attr3"], "float");
        assert_eq!(annotations["attr4"], "str");

        let nested = scanner.docstrings_in_namespace("ClassA.ClassC").unwrap();
        assert_eq!(nested["attr1"], "nested class attributes comment");
        assert_eq!(scanner.annotations_in_namespace("ClassA.ClassC").unwrap()["attr1"], "None");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let once = scanner();
        once.parse().unwrap();
        let twice = scanner();
        twice.parse().unwrap();
        twice.parse().unwrap();
        assert_eq!(once.tables.get(), twice.tables.get());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_docstring_precedence_within_statement() {
        let code = "#: before\nx = 1  #: after\n\"\"\"literal\"\"\"\n#: before\ny = 2  #: after\n";
        let scanner = VariableScanner::new(code, SourceEncoding::Utf8);
        let docs = scanner.docstrings_in_namespace("").unwrap();
        assert_eq!(docs["x"], "literal");
        assert_eq!(docs["y"], "after");
    }

    #[test]
    fn test_duplicate_policy() {
        let code = "x = 1  #: first\nx = 2  #: second\n";
        let first = VariableScanner::new(code, SourceEncoding::Utf8);
        assert_eq!(first.docstrings_in_namespace("").unwrap()["x"], "first");

        let last = VariableScanner::new(code, SourceEncoding::Utf8).with_policy(DuplicatePolicy::LastWins);
        assert_eq!(last.docstrings_in_namespace("").unwrap()["x"], "second");
    }

    #[test]
    fn test_nested_blocks_are_scanned() {
        let code = "try:\n    import json\n    x = 1  #: in try\nexcept ImportError:\n    x = 2  #: in except\nif True:\n    y: int = 3\n";
        let scanner = VariableScanner::new(code, SourceEncoding::Utf8);
        assert_eq!(scanner.docstrings_in_namespace("").unwrap()["x"], "in try");
        assert_eq!(scanner.annotations_in_namespace("").unwrap()["y"], "int");
    }

    #[test]
    fn test_invalid_source_is_a_syntax_error() {
        let scanner = VariableScanner::new("class :\n", SourceEncoding::Utf8).with_origin("broken.py");
        let err = scanner.parse().unwrap_err();
        assert!(matches!(err, crate::error::DocprobeError::Syntax { .. }));
        assert!(err.to_string().contains("broken.py"));
    }

    #[test]
    fn test_latin1_bytes() {
        let scanner = VariableScanner::from_bytes(b"x = 1  #: caf\xe9\n", SourceEncoding::Latin1, "m.py").unwrap();
        assert_eq!(scanner.docstrings_in_namespace("").unwrap()["x"], "café");
    }
}
