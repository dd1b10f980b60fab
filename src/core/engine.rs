// src/core/engine.rs
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

use super::model::Doc;
use super::parser::{
    CommandDocTreeBuilder, ParserSuiteKind, ParserSuitesRegistry, ReStParserSuite, SourceCodeOptions,
    SourceCodeParserSuite,
};
use super::program::{LoadOptions, Program};
use super::report::DocReport;
use crate::config::Config;

const CONFIG_FILE: &str = "Docprobe.toml";

/// How reports are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("Unknown output format '{}', expected text or json", other),
        }
    }
}

/// Main orchestration engine for Docprobe
pub struct Engine {
    config: Config,
    registry: ParserSuitesRegistry,
}

impl Engine {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            registry: ParserSuitesRegistry::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write the effective configuration to `Docprobe.toml` under `path`
    pub fn init(&self, path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to determine the current directory")?,
        };
        info!("📝 Initializing Docprobe in: {}", target_dir.display());

        let target = target_dir.join(CONFIG_FILE);
        if target.exists() && !force {
            bail!("{} already exists, pass --force to overwrite it", target.display());
        }
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;
        self.config()
            .save(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        info!("✅ Wrote {}", target.display());
        Ok(target)
    }

    /// Load every module under the configured source directories, or under
    /// `sources` when given
    fn load_program(&self, sources: &[PathBuf]) -> Result<Rc<Program>> {
        let mut options = LoadOptions::from_config(&self.config)?;
        if !sources.is_empty() {
            options.roots = sources.to_vec();
        }
        info!("🔍 Loading Python sources from {:?}", options.roots);
        let program = Program::load(&options)?;

        let failed = program.failed_imports();
        if !failed.is_empty() {
            warn!("⚠️ {} module(s) could not be loaded", failed.len());
            for (module, reason) in failed {
                debug!("  {}: {}", module, reason);
            }
        }
        Ok(program)
    }

    fn output_format(&self, format: Option<&str>) -> Result<OutputFormat> {
        OutputFormat::parse(format.unwrap_or(&self.config.output.format))
    }

    /// Documentation of a module found in the program
    pub fn inspect_report(&self, module: &str, sources: &[PathBuf]) -> Result<DocReport> {
        let kind = self.registry.get(ParserSuiteKind::SourceCode.name())?;
        let program = self.load_program(sources)?;
        let suite = SourceCodeParserSuite::new(program, SourceCodeOptions::from_config(&self.config)?);

        let module = suite
            .module(module)
            .with_context(|| format!("Failed to document module {}", module))?;
        let report = DocReport::new(kind.name(), &Doc::Module(module), self.config.output.include_private);
        info!("📊 Documented {} objects", report.entry_count());
        Ok(report)
    }

    pub fn inspect(&self, module: &str, sources: Vec<PathBuf>, format: Option<String>) -> Result<()> {
        let format = self.output_format(format.as_deref())?;
        let report = self.inspect_report(module, &sources)?;
        println!("{}", render(&report, format)?);
        Ok(())
    }

    /// Documentation of a page tree, from a pre-built environment or by
    /// running the configured builder over `source`
    pub fn rest_report(&self, env: Option<PathBuf>, source: Option<PathBuf>, path: Option<String>) -> Result<DocReport> {
        let kind = self.registry.get(ParserSuiteKind::ReSt.name())?;
        let program = self.load_program(&[])?;

        let suite = match (env.or_else(|| self.config.rest.environment.clone()), source) {
            (_, Some(source)) => {
                let builder = CommandDocTreeBuilder::new(self.config.rest.builder_command.clone());
                ReStParserSuite::build(&source, &builder, program)
                    .with_context(|| format!("Failed to build documentation from {}", source.display()))?
            }
            (Some(env), None) => ReStParserSuite::load_environment(&env, program)
                .with_context(|| format!("Failed to load build environment {}", env.display()))?,
            (None, None) => return Err(anyhow!("Either an environment file or a source directory is required")),
        };

        let path = path.unwrap_or_else(|| self.config.rest.root_path.clone());
        info!("📖 Reading documentation tree from {}", path);
        let root = suite.root(&path);
        let report = DocReport::new(kind.name(), &Doc::Module(root), self.config.output.include_private);
        info!("📊 Documented {} objects", report.entry_count());
        Ok(report)
    }

    pub fn rest(
        &self,
        env: Option<PathBuf>,
        source: Option<PathBuf>,
        path: Option<String>,
        format: Option<String>,
    ) -> Result<()> {
        let format = self.output_format(format.as_deref())?;
        let report = self.rest_report(env, source, path)?;
        println!("{}", render(&report, format)?);
        Ok(())
    }

    /// Names of the available parser suites
    pub fn suites(&self) -> Result<()> {
        for name in self.registry.available_parser_suite_types() {
            println!("{}", name);
        }
        Ok(())
    }
}

fn render(report: &DocReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => report.root.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    })
}
