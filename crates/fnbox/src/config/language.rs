use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ContainerLimits;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Placeholder for the staged source file in `run` commands
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Placeholder for inline code in `inline` commands
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "Python 3")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Base image for cold runs
    pub image: String,

    /// Launcher for a staged source file
    /// Placeholders: {source}
    pub run: Vec<String>,

    /// Launcher for inline code in a warm container
    /// Placeholders: {code}
    pub inline: Vec<String>,

    /// Container limits for cold runs (overrides defaults)
    #[serde(default)]
    pub limits: Option<ContainerLimits>,

    /// Warm container (None disables warm mode for the language)
    #[serde(default)]
    pub warm: Option<WarmConfig>,
}

impl Language {
    /// Source file name for a given stem
    pub fn source_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension)
    }

    /// Command that runs a staged source file
    pub fn run_command(&self, source: &str) -> Vec<String> {
        Self::expand_command(&self.run, SOURCE_PLACEHOLDER, source)
    }

    /// Command that runs `code` passed inline
    pub fn inline_command(&self, code: &str) -> Vec<String> {
        Self::expand_command(&self.inline, CODE_PLACEHOLDER, code)
    }

    /// Check if the language has a warm container configured
    pub fn supports_warm(&self) -> bool {
        self.warm.is_some()
    }

    /// Image for the warm container, falling back to the cold image
    pub fn warm_image(&self) -> Option<&str> {
        self.warm
            .as_ref()
            .map(|warm| warm.image.as_deref().unwrap_or(&self.image))
    }

    /// Expand a placeholder in the given command
    ///
    /// Each argument is expanded once, so a value containing the placeholder
    /// text is never expanded again.
    pub fn expand_command(command: &[String], placeholder: &str, value: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| arg.replace(placeholder, value))
            .collect()
    }
}

/// Long-lived container settings for a language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmConfig {
    /// Image override (defaults to the language image)
    #[serde(default)]
    pub image: Option<String>,

    /// Container name override (defaults to `warm-<id>-fn`)
    #[serde(default)]
    pub name: Option<String>,

    /// Foreground process that keeps the container alive
    #[serde(default = "default_keep_alive")]
    pub keep_alive: Vec<String>,
}

impl WarmConfig {
    /// Deterministic container name for a language ID
    pub fn container_name(&self, language_id: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("warm-{language_id}-fn"))
    }
}

fn default_keep_alive() -> Vec<String> {
    vec!["tail".to_owned(), "-f".to_owned(), "/dev/null".to_owned()]
}

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
