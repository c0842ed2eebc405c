//! Language runtime registry
//!
//! Maps a [`Language`] to the recipe used to run it: which interpreter to
//! invoke, how to pass it the source file, the file extension to write, and
//! how dependencies get installed. The registry is immutable after
//! construction and safe to share between concurrent executions.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

use crate::{
    error::Error,
    languages::{javascript, python, shell, typescript},
    types::Language,
};

/// Placeholder substituted with the absolute path of the source file
pub const FILE_PLACEHOLDER: &str = "{file}";

/// How a runtime resolves declared dependencies before the program runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// The runtime has no package manager; dependencies cannot be honoured
    Unsupported,
    /// `pip install --target` into a scratch directory exposed via `PYTHONPATH`
    Pip,
    /// `npm install` into a scratch package exposed via `NODE_PATH`
    Npm,
}

/// One way of invoking a runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub binary: String,
    /// Argument template; [`FILE_PLACEHOLDER`] marks the source file
    pub args: Vec<String>,
    /// Oldest `major.minor` reported by `<binary> --version` that accepts
    /// these arguments
    pub min_version: Option<(u64, u64)>,
}

impl Interpreter {
    pub fn new(binary: &str, args: &[&str]) -> Self {
        Self {
            binary: binary.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            min_version: None,
        }
    }

    pub fn with_min_version(mut self, major: u64, minor: u64) -> Self {
        self.min_version = Some((major, minor));
        self
    }

    /// Whether the binary at `path` is recent enough for this candidate.
    fn accepts(&self, path: &Path) -> bool {
        let Some(required) = self.min_version else {
            return true;
        };
        match installed_version(path) {
            Some(found) => found >= required,
            None => false,
        }
    }

    pub fn render_args(&self, source_file: &Path) -> Vec<String> {
        let file = source_file.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect()
    }
}

/// A concrete program and argument vector ready to be spawned
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Invocation recipe for one language
#[derive(Debug, Clone)]
pub struct RuntimeRecipe {
    pub language: Language,
    /// Candidates in order of preference
    pub interpreters: Vec<Interpreter>,
    pub extension: String,
    pub install: InstallStrategy,
    /// Runtimes that start worker threads and reserve large virtual ranges
    /// (V8) cannot run under an address-space or per-user task ceiling;
    /// their memory limit is passed as a heap flag instead.
    pub threaded: bool,
    /// Variables set for every run of this runtime, below user overrides
    pub env: Vec<(String, String)>,
}

impl RuntimeRecipe {
    /// Pick the first usable interpreter on `PATH`.
    ///
    /// Candidates with a version floor run `--version`, so this may block.
    /// Falls back to the first candidate so that a missing runtime surfaces
    /// as a spawn failure naming a concrete binary.
    pub fn select_interpreter(&self) -> Option<(&Interpreter, PathBuf)> {
        for candidate in &self.interpreters {
            let Ok(path) = which::which(&candidate.binary) else {
                continue;
            };
            if !candidate.accepts(&path) {
                debug!(
                    "Skipping {} interpreter {}: older than {:?}",
                    self.language,
                    path.display(),
                    candidate.min_version
                );
                continue;
            }
            debug!(
                "Resolved {} interpreter {} -> {}",
                self.language,
                candidate.binary,
                path.display()
            );
            return Some((candidate, path));
        }
        self.interpreters
            .first()
            .map(|candidate| (candidate, PathBuf::from(&candidate.binary)))
    }

    /// Build the command line for a source file.
    pub fn command_for(&self, source_file: &Path) -> Result<ResolvedCommand, Error> {
        let (interpreter, program) = self.select_interpreter().ok_or_else(|| {
            Error::UnsupportedLanguage(format!(
                "{} has no interpreter configured",
                self.language
            ))
        })?;
        Ok(ResolvedCommand {
            program,
            args: interpreter.render_args(source_file),
        })
    }

    pub fn is_available(&self) -> bool {
        self.interpreters.iter().any(|candidate| {
            which::which(&candidate.binary)
                .map(|path| candidate.accepts(&path))
                .unwrap_or(false)
        })
    }
}

/// `major.minor` printed by `<path> --version`, cached per binary.
fn installed_version(path: &Path) -> Option<(u64, u64)> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, Option<(u64, u64)>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    if let Some(found) = cache
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .get(path)
    {
        return *found;
    }

    let found = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| parse_version(&String::from_utf8_lossy(&output.stdout)));

    cache
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .insert(path.to_path_buf(), found);
    found
}

fn parse_version(text: &str) -> Option<(u64, u64)> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\.(\d+)").ok())
        .as_ref()?;
    let caps = pattern.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Lookup table from language to recipe
#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    recipes: HashMap<Language, RuntimeRecipe>,
}

impl RuntimeRegistry {
    /// Registry with every built-in runtime
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(python::recipe());
        registry.register(javascript::recipe());
        registry.register(typescript::recipe());
        registry.register(shell::recipe());
        registry
    }

    pub fn empty() -> Self {
        Self {
            recipes: HashMap::new(),
        }
    }

    /// Add or replace the recipe for `recipe.language`.
    pub fn register(&mut self, recipe: RuntimeRecipe) -> &mut Self {
        self.recipes.insert(recipe.language, recipe);
        self
    }

    pub fn resolve(&self, language: Language) -> Result<&RuntimeRecipe, Error> {
        self.recipes
            .get(&language)
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.recipes.keys().copied()
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
