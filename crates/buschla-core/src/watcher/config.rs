/// Watcher configuration: which directories to watch and which build
/// command to run when a qualifying file changes.
///
/// The configuration is fixed before the worker starts. It is serialised
/// into the worker as part of the [`WorkerHandshake`] instead of being
/// shared through memory.
use crate::error::WatcherError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of directories one watcher can observe.
pub const MAX_DIRECTORIES: usize = 256;

/// Build command run when no other command is configured.
pub const DEFAULT_BUILD_COMMAND: &str = "make app";

/// The build reaction: a shell command plus the predicate deciding which
/// changed files trigger it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionConfig {
    /// Command line passed to `sh -c`.
    pub command: String,
    /// Directory to run the command in. Inherits the worker's when `None`.
    pub working_dir: Option<PathBuf>,
    /// File extensions (without the dot) that trigger the command.
    pub extensions: Vec<String>,
    /// Exact file names that trigger the command.
    pub file_names: Vec<String>,
    /// Kill the command after this long. `None` lets it run indefinitely,
    /// during which the worker delivers no further change events.
    pub timeout: Option<Duration>,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_BUILD_COMMAND.to_owned(),
            working_dir: None,
            extensions: vec!["cpp".to_owned(), "h".to_owned()],
            file_names: vec!["Makefile".to_owned()],
            timeout: None,
        }
    }
}

impl ReactionConfig {
    /// Create a reaction running `command` with the default trigger list.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Whether a change to `path` should run the build command.
    pub fn should_trigger(&self, path: &Path) -> bool {
        let file_name = path.file_name().and_then(|n| n.to_str());
        if let Some(name) = file_name {
            if self.file_names.iter().any(|f| f == name) {
                return true;
            }
        }

        // `Path::extension` ignores dotfiles like ".h", which never trigger.
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }
}

/// Ordered list of watched directories plus the optional build reaction.
///
/// Directory order matters: when the OS reports a change, the owning
/// directory is looked up by its position in this list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    directories: Vec<PathBuf>,
    reaction: Option<ReactionConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchConfig {
    /// An empty config with the default build reaction.
    pub fn new() -> Self {
        Self {
            directories: Vec::new(),
            reaction: Some(ReactionConfig::default()),
        }
    }

    /// Append a directory to watch.
    pub fn append_directory(&mut self, path: impl Into<PathBuf>) -> Result<(), WatcherError> {
        let path = path.into();
        if self.directories.len() >= MAX_DIRECTORIES {
            return Err(WatcherError::TooManyDirectories {
                max: MAX_DIRECTORIES,
                path,
            });
        }
        self.directories.push(path);
        Ok(())
    }

    pub fn with_reaction(mut self, reaction: ReactionConfig) -> Self {
        self.reaction = Some(reaction);
        self
    }

    /// Disable the build reaction; changes are only reported.
    pub fn without_reaction(mut self) -> Self {
        self.reaction = None;
        self
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn reaction(&self) -> Option<&ReactionConfig> {
        self.reaction.as_ref()
    }
}

/// Everything the controller hands to a freshly spawned worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHandshake {
    /// Process id of the controller. The worker exits if its parent is
    /// already someone else by the time it starts.
    pub controller_pid: u32,
    pub config: WatchConfig,
}
