//! Backfilling annotations from `.pyi` stub files next to module sources.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

use super::variable_scanner::VariableScanner;
use crate::core::annotations::{self, Annotation};
use crate::core::inspect::object_module;
use crate::core::model::Doc;
use crate::core::program::{PyRef, SourceEncoding};
use crate::error::Result;

/// Adds type information from another source to already composed members
pub trait StubMerger: fmt::Debug {
    /// Fill in what the stub for `context`'s module knows about `namespace`
    fn merge(&self, context: &PyRef, namespace: &str, members: &mut IndexMap<String, Doc>);
}

/// Reads `<module>.pyi`, or `__init__.pyi` for packages, from the module's directory
#[derive(Debug)]
pub struct PyiStubMerger {
    encoding: SourceEncoding,
    scanners: RefCell<HashMap<PathBuf, Option<Rc<VariableScanner>>>>,
}

impl PyiStubMerger {
    pub fn new(encoding: SourceEncoding) -> Self {
        Self {
            encoding,
            scanners: RefCell::new(HashMap::new()),
        }
    }

    fn stub_path(context: &PyRef) -> Option<PathBuf> {
        let program = context.program();
        let module = match context.object().as_module() {
            Some(module) => module,
            None => program.module(program.module_id(&object_module(context)?)?)?,
        };
        Some(module.source.as_ref()?.path.with_extension("pyi"))
    }

    fn scanner(&self, path: &Path) -> Option<Rc<VariableScanner>> {
        if let Some(scanner) = self.scanners.borrow().get(path) {
            return scanner.clone();
        }
        let scanner = if path.is_file() {
            match self.load(path) {
                Ok(scanner) => Some(Rc::new(scanner)),
                Err(e) => {
                    warn!("Error parsing type stubs {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            debug!("No type stubs at {}", path.display());
            None
        };
        self.scanners.borrow_mut().insert(path.to_path_buf(), scanner.clone());
        scanner
    }

    fn load(&self, path: &Path) -> Result<VariableScanner> {
        let bytes = fs::read(path)?;
        let scanner = VariableScanner::from_bytes(&bytes, self.encoding, &path.display().to_string())?;
        scanner.parse()?;
        Ok(scanner)
    }
}

impl StubMerger for PyiStubMerger {
    fn merge(&self, context: &PyRef, namespace: &str, members: &mut IndexMap<String, Doc>) {
        let Some(path) = Self::stub_path(context) else {
            return;
        };
        let Some(scanner) = self.scanner(&path) else {
            return;
        };
        let stubbed = match scanner.annotations_in_namespace(namespace) {
            Ok(stubbed) => stubbed,
            Err(e) => {
                warn!("Error parsing type stubs {}: {}", path.display(), e);
                return;
            }
        };

        for (name, member) in members.iter_mut() {
            let Doc::Variable(variable) = member else {
                continue;
            };
            if variable.base().is_inherited() || !variable.annotation.is_empty() {
                continue;
            }
            let Some(text) = stubbed.get(name) else {
                continue;
            };
            let fullname = variable.base().fullname().to_string();
            match Rc::get_mut(variable) {
                Some(variable) => {
                    variable.annotation = Annotation::Type(annotations::resolve(text, context, &fullname));
                }
                None => debug!("{} is shared, not applying its stub annotation", fullname),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Namespace;
    use crate::core::parser::{SourceCodeOptions, SourceCodeParserSuite};
    use crate::core::program::{LoadOptions, Program};

    #[test]
    fn test_stub_backfills_missing_annotations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("m.py"),
            "count = 0\nlabel: str = 'x'\n#: Documented.\nratio = 0.5\n\nclass Box:\n    size = 1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("m.pyi"),
            "count: int\nlabel: bytes\nratio: float\n\nclass Box:\n    size: int\n",
        )
        .unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        let suite = SourceCodeParserSuite::new(program, SourceCodeOptions::default());
        let module = suite.module("m").unwrap();
        let members = module.members();

        let annotation = |name: &str| members[name].as_variable().unwrap().annotation_str();
        assert_eq!(annotation("ratio"), ": float");
        // source annotations win over the stub
        assert_eq!(annotation("label"), ": str");
        assert_eq!(members["ratio"].docstring(), "Documented.");

        let boxed = members["Box"].as_class().unwrap();
        assert_eq!(boxed.members()["size"].as_variable().unwrap().annotation_str(), ": int");
    }

    #[test]
    fn test_missing_and_broken_stubs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain.py"), "#: Doc.\nvalue = 1\n").unwrap();
        fs::write(dir.path().join("broken.py"), "#: Doc.\nvalue = 1\n").unwrap();
        fs::write(dir.path().join("broken.pyi"), "value: int = (\n").unwrap();
        let program = Program::load(&LoadOptions::new([dir.path()])).unwrap();
        let suite = SourceCodeParserSuite::new(program, SourceCodeOptions::default());

        for name in ["plain", "broken"] {
            let module = suite.module(name).unwrap();
            let value = module.members()["value"].as_variable().unwrap().clone();
            assert_eq!(value.annotation_str(), "", "{}", name);
            assert_eq!(value.default_value_str(), " = 1");
        }
    }
}
