//! Tree-sitter helpers shared by the program loader, the variable scanner and
//! the annotation resolver.

use tree_sitter::{Node, Parser, Tree};

use crate::error::{DocprobeError, Result};

/// Build a parser configured for Python sources
pub fn python_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    let python_language = tree_sitter_python::language();
    parser
        .set_language(&python_language)
        .map_err(|e| DocprobeError::syntax("parser", format!("Failed to set Python language: {}", e)))?;
    Ok(parser)
}

/// Parse a complete source text, rejecting anything tree-sitter had to recover from
pub fn parse_source(source: &str, origin: &str) -> Result<Tree> {
    let mut parser = python_parser()?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| DocprobeError::syntax(origin, "parser produced no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        let position = first_error(root)
            .map(|n| format!("line {}, column {}", n.start_position().row + 1, n.start_position().column + 1))
            .unwrap_or_else(|| "unknown position".to_string());
        return Err(DocprobeError::syntax(origin, format!("invalid syntax at {}", position)));
    }

    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Extract text content of a node
pub fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// Named statement children of a block or module, comments excluded
pub fn statements(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// The string value of a statement consisting of a lone string literal
pub fn docstring_statement(stmt: Node, source: &str) -> Option<String> {
    if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
        return None;
    }
    let expr = stmt.named_child(0)?;
    string_value(expr, source)
}

/// The docstring of a module, class or function body
pub fn body_docstring(body: Node, source: &str) -> Option<String> {
    statements(body)
        .first()
        .and_then(|first| docstring_statement(*first, source))
}

/// Decode a `string` or `concatenated_string` node into its runtime value
pub fn string_value(node: Node, source: &str) -> Option<String> {
    match node.kind() {
        "string" => decode_string_literal(node_text(node, source)),
        "concatenated_string" => {
            let mut cursor = node.walk();
            let mut value = String::new();
            for part in node.named_children(&mut cursor) {
                value.push_str(&string_value(part, source)?);
            }
            Some(value)
        }
        _ => None,
    }
}

/// Decode the literal text of a Python string, e.g. `r'\d'` or `"""doc"""`
pub fn decode_string_literal(literal: &str) -> Option<String> {
    let prefix_len = literal
        .char_indices()
        .find(|(_, c)| *c == '\'' || *c == '"')
        .map(|(i, _)| i)?;
    let prefix = literal[..prefix_len].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') {
        // formatted strings have no static value, bytes are not text
        return None;
    }
    let body = &literal[prefix_len..];

    let quote = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|q| body.starts_with(q) && body.len() >= 2 * q.len() && body.ends_with(q))?;
    let inner = &body[quote.len()..body.len() - quote.len()];

    if prefix.contains('r') {
        Some(inner.to_string())
    } else {
        Some(unescape(inner))
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            // escaped newline continues the line
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Render a string the way Python's `repr()` does
pub fn python_str_repr(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Normalise a literal expression text to its `repr()` form where that is
/// statically known; other expressions are returned unchanged.
pub fn literal_repr(text: &str) -> String {
    let trimmed = text.trim();
    match decode_string_literal(trimmed) {
        Some(value) if is_single_literal(trimmed) => python_str_repr(&value),
        _ => trimmed.to_string(),
    }
}

fn is_single_literal(text: &str) -> bool {
    // `'a' 'b'` and `'a' + x` are not a single literal
    let Some(value_start) = text.find(|c| c == '\'' || c == '"') else {
        return false;
    };
    let body = &text[value_start..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.starts_with(quote) {
            let inner = &body[quote.len()..];
            return match find_closing(inner, quote) {
                Some(end) => end + quote.len() == inner.len(),
                None => false,
            };
        }
    }
    false
}

fn find_closing(inner: &str, quote: &str) -> Option<usize> {
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            // the escaped character never closes the literal
            chars.next();
            continue;
        }
        if inner[i..].starts_with(quote) {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_string_literal() {
        assert_eq!(decode_string_literal("'abc'"), Some("abc".to_string()));
        assert_eq!(decode_string_literal("\"a\\nb\""), Some("a\nb".to_string()));
        assert_eq!(decode_string_literal("r'\\d+'"), Some("\\d+".to_string()));
        assert_eq!(
            decode_string_literal("\"\"\"\n    multi\n\"\"\""),
            Some("\n    multi\n".to_string())
        );
        assert_eq!(decode_string_literal("f'{x}'"), None);
        assert_eq!(decode_string_literal("b'raw'"), None);
    }

    #[test]
    fn test_python_str_repr() {
        assert_eq!(python_str_repr("default"), "'default'");
        assert_eq!(python_str_repr("it's"), "\"it's\"");
        assert_eq!(python_str_repr("a\nb"), "'a\\nb'");
    }

    #[test]
    fn test_literal_repr() {
        assert_eq!(literal_repr("\"default\""), "'default'");
        assert_eq!(literal_repr("3.1415925"), "3.1415925");
        assert_eq!(literal_repr("'a' + b"), "'a' + b");
        assert_eq!(literal_repr("['a', 'b']"), "['a', 'b']");
    }

    #[test]
    fn test_literal_repr_non_ascii() {
        assert_eq!(literal_repr("\"café bar\""), "'café bar'");
        assert_eq!(literal_repr("'José'"), "'José'");
        assert_eq!(literal_repr("'\\é' + x"), "'\\é' + x");
        assert_eq!(literal_repr("'naïve' 'ü'"), "'naïve' 'ü'");
        assert_eq!(find_closing("é\\'ü'", "'"), Some(6));
    }

    #[test]
    fn test_parse_source_rejects_invalid_syntax() {
        assert!(parse_source("x = 1\n", "ok").is_ok());
        let err = parse_source("def broken(:\n", "broken.py").unwrap_err();
        assert!(err.to_string().contains("broken.py"));
    }

    #[test]
    fn test_body_docstring() {
        let source = "\"\"\"Module doc.\"\"\"\nx = 1\n";
        let tree = parse_source(source, "m").unwrap();
        assert_eq!(body_docstring(tree.root_node(), source), Some("Module doc.".to_string()));
    }
}
