use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DocprobeError, Result};

/// Byte encodings accepted for Python sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl SourceEncoding {
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Self::Latin1),
            other => Err(DocprobeError::Config(format!("unsupported source encoding '{}'", other))),
        }
    }

    pub fn decode(&self, bytes: &[u8], origin: &str) -> Result<String> {
        match self {
            Self::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| DocprobeError::syntax(origin, format!("invalid utf-8: {}", e)))
            }
            // latin-1 maps every byte to the code point of the same value
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8 => write!(f, "utf-8"),
            Self::Latin1 => write!(f, "latin-1"),
        }
    }
}

/// The text of one loaded module file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub content_hash: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: String) -> Self {
        let content_hash = Self::hash(&text);
        Self {
            path: path.into(),
            text,
            content_hash,
        }
    }

    pub fn read(path: &Path, encoding: SourceEncoding) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = encoding.decode(&bytes, &path.display().to_string())?;
        Ok(Self::new(path, text))
    }

    fn hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_labels() {
        assert_eq!(SourceEncoding::from_label("UTF-8").unwrap(), SourceEncoding::Utf8);
        assert_eq!(SourceEncoding::from_label("latin_1").unwrap(), SourceEncoding::Latin1);
        assert!(SourceEncoding::from_label("cp1252").is_err());
    }

    #[test]
    fn test_latin1_decodes_every_byte() {
        let text = SourceEncoding::Latin1.decode(b"caf\xe9", "m").unwrap();
        assert_eq!(text, "café");
        assert!(SourceEncoding::Utf8.decode(b"caf\xe9", "m").is_err());
    }

    #[test]
    fn test_identical_text_hashes_identically() {
        let a = SourceFile::new("a.py", "x = 1\n".to_string());
        let b = SourceFile::new("b.py", "x = 1\n".to_string());
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }
}
