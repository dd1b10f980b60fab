//! Member resolution from documentation trees built by an external toolchain.
//!
//! Every page of the tree counts as a module: its `desc` nodes become members
//! and its toctree children become submodules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{Parser, ParserKey};
use crate::core::inspect::{is_constant, safe_getattr};
use crate::core::model::{Class, Doc, Function, Module, Variable};
use crate::core::program::{Program, PyRef};
use crate::error::{DocprobeError, Result};

/// File name of the environment inside a build output directory
pub const ENVIRONMENT_FILE: &str = "environment.json";

/// Titles, toctree and doctree location of a finished documentation build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildEnvironment {
    #[serde(default)]
    pub titles: HashMap<String, String>,
    #[serde(default)]
    pub toctree_includes: HashMap<String, Vec<String>>,
    pub doctreedir: PathBuf,
}

impl BuildEnvironment {
    /// Read an environment file; a relative `doctreedir` is taken relative to the file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DocprobeError::DocTree(format!("cannot read environment {}: {}", path.display(), e)))?;
        let mut env: BuildEnvironment = serde_json::from_str(&content)?;
        if env.doctreedir.is_relative() {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            env.doctreedir = parent.join(&env.doctreedir);
        }
        Ok(env)
    }
}

/// One node of a serialized doctree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocNode {
    pub tagname: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub children: Vec<DocNode>,
}

impl DocNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|value| value.as_str())
    }

    /// `desc` nodes in document order; nodes inside a `desc` are not visited
    pub fn descs(&self) -> Vec<&DocNode> {
        let mut found = Vec::new();
        self.collect_descs(&mut found);
        found
    }

    fn collect_descs<'a>(&'a self, found: &mut Vec<&'a DocNode>) {
        if self.tagname == "desc" {
            found.push(self);
            return;
        }
        for child in &self.children {
            child.collect_descs(found);
        }
    }
}

/// Turns documentation sources into a build environment
pub trait DocTreeBuilder {
    /// Build `source` into `output` and return the environment file
    fn build(&self, source: &Path, output: &Path) -> Result<PathBuf>;
}

/// Runs an external command; `{source}` and `{output}` in its arguments are substituted
#[derive(Debug, Clone)]
pub struct CommandDocTreeBuilder {
    command: Vec<String>,
}

impl CommandDocTreeBuilder {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl DocTreeBuilder for CommandDocTreeBuilder {
    fn build(&self, source: &Path, output: &Path) -> Result<PathBuf> {
        let substitute = |arg: &String| {
            arg.replace("{source}", &source.display().to_string())
                .replace("{output}", &output.display().to_string())
        };
        let Some((program, args)) = self.command.split_first() else {
            return Err(DocprobeError::Build("no builder command configured".to_string()));
        };

        info!("🔨 Building documentation tree from {}", source.display());
        let result = Command::new(substitute(program))
            .args(args.iter().map(substitute))
            .output()
            .map_err(|e| DocprobeError::Build(format!("cannot run {}: {}", program, e)))?;
        if !result.status.success() {
            return Err(DocprobeError::Build(format!(
                "{} exited with {}: {}",
                program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        let env = output.join(ENVIRONMENT_FILE);
        if !env.is_file() {
            return Err(DocprobeError::DocTree(format!("build produced no {}", env.display())));
        }
        Ok(env)
    }
}

/// Documentation tree pages and the program their entries refer to
pub struct ReStParserSuite {
    env: BuildEnvironment,
    program: Rc<Program>,
    /// Build output owned by the suite, removed when it is dropped
    output_dir: Option<TempDir>,
    imports: RefCell<HashMap<String, Option<PyRef>>>,
}

impl fmt::Debug for ReStParserSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReStParserSuite")
            .field("doctreedir", &self.env.doctreedir)
            .field("output_dir", &self.output_dir.as_ref().map(|d| d.path()))
            .finish()
    }
}

impl ReStParserSuite {
    pub fn from_environment(env: BuildEnvironment, program: Rc<Program>) -> Rc<Self> {
        Rc::new(Self {
            env,
            program,
            output_dir: None,
            imports: RefCell::new(HashMap::new()),
        })
    }

    pub fn load_environment(path: &Path, program: Rc<Program>) -> Result<Rc<Self>> {
        Ok(Self::from_environment(BuildEnvironment::load(path)?, program))
    }

    /// Build `source` into a temporary directory owned by the suite
    pub fn build(source: &Path, builder: &dyn DocTreeBuilder, program: Rc<Program>) -> Result<Rc<Self>> {
        let output_dir = TempDir::new()?;
        let env = BuildEnvironment::load(&builder.build(source, output_dir.path())?)?;
        Ok(Rc::new(Self {
            env,
            program,
            output_dir: Some(output_dir),
            imports: RefCell::new(HashMap::new()),
        }))
    }

    pub fn environment(&self) -> &BuildEnvironment {
        &self.env
    }

    pub fn doctreedir(&self) -> &Path {
        &self.env.doctreedir
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_ref().map(|d| d.path())
    }

    /// Pages included by the toctree of `path`
    pub fn toctree(&self, path: &str) -> &[String] {
        self.env.toctree_includes.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_title(&self, path: &str) -> Option<&str> {
        self.env.titles.get(path).map(String::as_str)
    }

    pub fn parser(self: &Rc<Self>, path: impl Into<String>) -> Rc<ReStParser> {
        Rc::new(ReStParser {
            path: path.into(),
            suite: self.clone(),
        })
    }

    /// The page at `path` as a synthetic module named after its title
    pub fn root(self: &Rc<Self>, path: &str) -> Rc<Module> {
        let title = self.find_title(path).unwrap_or(path).to_string();
        let parser: Rc<dyn Parser> = self.parser(path);
        Rc::new(Module::new("", title, None, (String::new(), String::new()), Some(parser)))
    }

    /// Import a module once; failures are remembered
    fn import(&self, module: &str) -> Option<PyRef> {
        if let Some(cached) = self.imports.borrow().get(module) {
            return cached.clone();
        }
        let imported = match self.program.import_module(module) {
            Ok(id) => Some(PyRef::new(self.program.clone(), id)),
            Err(e) => {
                warn!("Can not import {}: {}", module, e);
                None
            }
        };
        self.imports.borrow_mut().insert(module.to_string(), imported.clone());
        imported
    }

    /// The program object a signature entry describes
    fn resolve(&self, module: &str, qualname: &str) -> Option<PyRef> {
        let mut current = self.import(module)?;
        for part in qualname.split('.') {
            match safe_getattr(&current, part) {
                Some(next) => current = next,
                None => {
                    warn!("Cannot find {} in {}", qualname, module);
                    return None;
                }
            }
        }
        Some(current)
    }
}

/// Members of one documentation page
pub struct ReStParser {
    path: String,
    suite: Rc<ReStParserSuite>,
}

impl fmt::Debug for ReStParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReStParser").field("path", &self.path).finish()
    }
}

impl ReStParser {
    pub fn path(&self) -> &str {
        &self.path
    }

    fn load_page(&self) -> Result<DocNode> {
        let file = self.suite.doctreedir().join(format!("{}.doctree", self.path));
        let content = fs::read_to_string(&file)
            .map_err(|e| DocprobeError::DocTree(format!("cannot read {}: {}", file.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn signature_to_doc(&self, objtype: &str, signature: &DocNode) -> Option<Doc> {
        let module = signature.attribute("module").unwrap_or_default();
        let qualname = signature.attribute("fullname").unwrap_or_default();
        let location = (module.to_string(), qualname.to_string());

        let doc = match objtype {
            "class" => {
                let obj = self.suite.resolve(module, qualname);
                Class::new(module, qualname, obj, location, None).into()
            }
            "function" | "method" => {
                let obj = self.suite.resolve(module, qualname);
                Function::new(module, qualname, obj, location).into()
            }
            "attribute" | "data" => {
                let obj = self.suite.resolve(module, qualname);
                let name = qualname.rsplit('.').next().unwrap_or(qualname);
                Variable::new(module, qualname, location)
                    .with_default(obj)
                    .constant(is_constant(name, objtype))
                    .into()
            }
            other => {
                debug!("Skipping {} entry {}.{}", other, module, qualname);
                return None;
            }
        };
        Some(doc)
    }
}

impl Parser for ReStParser {
    fn members(&self) -> Result<IndexMap<String, Doc>> {
        debug!("Reading documentation page {}", self.path);
        let page = self.load_page()?;
        let mut members = IndexMap::new();
        for desc in page.descs() {
            let objtype = desc.attribute("objtype").unwrap_or_default();
            for signature in desc.children.iter().filter(|c| c.tagname == "desc_signature") {
                if let Some(doc) = self.signature_to_doc(objtype, signature) {
                    members.insert(doc.fullname().to_string(), doc);
                }
            }
        }
        Ok(members)
    }

    fn submodules(&self) -> Vec<Rc<Module>> {
        self.suite
            .toctree(&self.path)
            .iter()
            .map(|path| self.suite.root(path))
            .collect()
    }

    fn key(&self) -> ParserKey {
        ParserKey::ReSt {
            path: self.path.clone(),
            suite: Rc::as_ptr(&self.suite) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Namespace;
    use crate::core::program::LoadOptions;
    use serde_json::json;

    const SOURCE: &str = r#"
LIMIT = 10

class Widget:
    size = 3

    def render(self):
        """Draw it."""

def build():
    """Make a widget."""
"#;

    fn signature(objtype: &str, module: &str, fullname: &str) -> serde_json::Value {
        json!({
            "tagname": "desc",
            "attributes": {"objtype": objtype},
            "children": [
                {"tagname": "desc_signature", "attributes": {"module": module, "fullname": fullname}},
                {"tagname": "desc_content", "children": [
                    {"tagname": "desc", "attributes": {"objtype": "method"}, "children": [
                        {"tagname": "desc_signature", "attributes": {"module": module, "fullname": "nested"}}
                    ]}
                ]}
            ]
        })
    }

    /// Writes a built tree with an `index` page including an `api` page
    fn write_tree(dir: &Path) {
        fs::create_dir_all(dir.join(".doctrees")).unwrap();
        let env = json!({
            "titles": {"index": "Welcome", "api": "API Reference"},
            "toctree_includes": {"index": ["api"]},
            "doctreedir": ".doctrees"
        });
        fs::write(dir.join(ENVIRONMENT_FILE), env.to_string()).unwrap();

        let index = json!({"tagname": "document", "children": [{"tagname": "section", "children": []}]});
        fs::write(dir.join(".doctrees/index.doctree"), index.to_string()).unwrap();

        let api = json!({
            "tagname": "document",
            "children": [{
                "tagname": "section",
                "children": [
                    signature("class", "m", "Widget"),
                    signature("function", "m", "build"),
                    signature("data", "m", "LIMIT"),
                    signature("attribute", "m", "Widget.size"),
                    signature("method", "m", "Widget.render"),
                    signature("exception", "m", "Oops"),
                    signature("class", "absent", "Thing")
                ]
            }]
        });
        fs::write(dir.join(".doctrees/api.doctree"), api.to_string()).unwrap();
    }

    fn program(dir: &Path) -> Rc<Program> {
        fs::write(dir.join("m.py"), SOURCE).unwrap();
        Program::load(&LoadOptions::new([dir])).unwrap()
    }

    #[test]
    fn test_environment_and_toctree() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let suite = ReStParserSuite::load_environment(&dir.path().join(ENVIRONMENT_FILE), Program::empty()).unwrap();

        assert_eq!(suite.doctreedir(), dir.path().join(".doctrees"));
        assert_eq!(suite.toctree("index"), ["api".to_string()]);
        assert!(suite.toctree("api").is_empty());
        assert_eq!(suite.find_title("api"), Some("API Reference"));
        assert!(suite.output_dir().is_none());

        let root = suite.root("index");
        assert_eq!(root.base().fullname(), "Welcome");
        assert!(root.members().is_empty());
        let children: Vec<&str> = root.submodules().iter().map(|m| m.base().fullname()).collect();
        assert_eq!(children, ["API Reference"]);
    }

    #[test]
    fn test_members_from_page() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let suite = ReStParserSuite::load_environment(&dir.path().join(ENVIRONMENT_FILE), program(dir.path())).unwrap();
        let members = suite.parser("api").members().unwrap();

        let names: Vec<&String> = members.keys().collect();
        assert_eq!(names, ["m.Widget", "m.build", "m.LIMIT", "m.Widget.size", "m.Widget.render", "absent.Thing"]);

        let widget = members["m.Widget"].as_class().unwrap();
        assert!(widget.obj().is_some());
        assert!(widget.members().is_empty());
        assert_eq!(members["m.build"].docstring(), "Make a widget.");
        assert_eq!(members["m.Widget.render"].docstring(), "Draw it.");

        let limit = members["m.LIMIT"].as_variable().unwrap();
        assert!(limit.is_const);
        assert_eq!(limit.default_value_str(), " = 10");
        let size = members["m.Widget.size"].as_variable().unwrap();
        assert!(!size.is_const);
        assert_eq!(size.default_value_str(), " = 3");

        let thing = members["absent.Thing"].as_class().unwrap();
        assert!(thing.obj().is_none());
        assert_eq!(thing.signature().to_string(), "(unknown)");
    }

    #[test]
    fn test_missing_page() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let suite = ReStParserSuite::load_environment(&dir.path().join(ENVIRONMENT_FILE), Program::empty()).unwrap();

        assert!(matches!(suite.parser("missing").members(), Err(DocprobeError::DocTree(_))));
        assert!(matches!(
            ReStParserSuite::load_environment(&dir.path().join("nothing.json"), Program::empty()),
            Err(DocprobeError::DocTree(_))
        ));
    }

    #[test]
    fn test_parsers_compare_by_page_and_suite() {
        let suite = ReStParserSuite::from_environment(BuildEnvironment::default(), Program::empty());
        let other = ReStParserSuite::from_environment(BuildEnvironment::default(), Program::empty());
        assert_eq!(suite.parser("api").key(), suite.parser("api").key());
        assert_ne!(suite.parser("api").key(), suite.parser("index").key());
        assert_ne!(suite.parser("api").key(), other.parser("api").key());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_builder() {
        let source = tempfile::tempdir().unwrap();
        write_tree(source.path());
        let builder = CommandDocTreeBuilder::new(vec![
            "cp".to_string(),
            "-R".to_string(),
            "{source}/.".to_string(),
            "{output}".to_string(),
        ]);

        let suite = ReStParserSuite::build(source.path(), &builder, Program::empty()).unwrap();
        let output = suite.output_dir().unwrap().to_path_buf();
        assert!(suite.doctreedir().starts_with(&output));
        assert_eq!(suite.find_title("index"), Some("Welcome"));

        drop(suite);
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_builder_failures() {
        let source = tempfile::tempdir().unwrap();
        let failing = CommandDocTreeBuilder::new(vec!["false".to_string()]);
        assert!(matches!(
            ReStParserSuite::build(source.path(), &failing, Program::empty()),
            Err(DocprobeError::Build(_))
        ));

        let silent = CommandDocTreeBuilder::new(vec!["true".to_string()]);
        assert!(matches!(
            ReStParserSuite::build(source.path(), &silent, Program::empty()),
            Err(DocprobeError::DocTree(_))
        ));

        let missing = CommandDocTreeBuilder::new(vec!["docprobe-no-such-builder".to_string()]);
        assert!(matches!(
            ReStParserSuite::build(source.path(), &missing, Program::empty()),
            Err(DocprobeError::Build(_))
        ));
        assert!(matches!(
            ReStParserSuite::build(source.path(), &CommandDocTreeBuilder::new(Vec::new()), Program::empty()),
            Err(DocprobeError::Build(_))
        ));
    }
}
