//! TOML configuration for the compute playground.
//!
//! Every field has a default, so a missing file (or a file that only sets a
//! couple of keys) yields a usable configuration. The file is located by
//! [`locate`] in this order:
//!
//! 1. an explicit path (the `--config` flag),
//! 2. the `PLAYGROUND_CONFIG` environment variable,
//! 3. `./playground.toml`,
//! 4. `playground.toml` inside the per-user config directory.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories_next::ProjectDirs;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::debug;

pub const ENV_CONFIG: &str = "PLAYGROUND_CONFIG";
pub const CONFIG_FILE_NAME: &str = "playground.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "ComputePlayground";
const APPLICATION: &str = "playground";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Shader compiler requested in the `[runtime]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerChoice {
    #[default]
    Naga,
    Shaderc,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    pub version: u32,
    pub window: WindowConfig,
    pub programs: ProgramsConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgramsConfig {
    /// Directory scanned for programs; relative paths resolve against the
    /// working directory.
    pub root: PathBuf,
    /// Program file extension, without the leading dot.
    pub extension: String,
    /// Catalog index selected at start-up.
    pub initial: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long a compile failure stays visible in the window title.
    #[serde(deserialize_with = "deserialize_duration")]
    pub error_display: Duration,
    pub persistent_scratch_mib: u32,
    pub compiler: CompilerChoice,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            version: 1,
            window: WindowConfig::default(),
            programs: ProgramsConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Compute Playground".to_string(),
            vsync: true,
        }
    }
}

impl Default for ProgramsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tutorials"),
            extension: "comp".to_string(),
            initial: 0,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            error_display: Duration::from_secs(5),
            persistent_scratch_mib: 64,
            compiler: CompilerChoice::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn persistent_scratch_bytes(&self) -> u64 {
        u64::from(self.persistent_scratch_mib) * 1024 * 1024
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl PlaygroundConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PlaygroundConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Locates and loads the configuration, returning the file it came from.
    ///
    /// No file anywhere in the lookup chain yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match locate(explicit)? {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                let config = Self::from_path(&path)?;
                Ok((config, Some(path)))
            }
            None => {
                debug!("no configuration file found; using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let extension = self.programs.extension.trim();
        if extension.is_empty() {
            return Err(ConfigError::Invalid(
                "programs.extension may not be empty".into(),
            ));
        }
        if extension.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "programs.extension '{extension}' must not include the leading dot"
            )));
        }

        if self.runtime.error_display.is_zero() {
            return Err(ConfigError::Invalid(
                "runtime.error_display must be greater than zero".into(),
            ));
        }

        if self.runtime.persistent_scratch_mib == 0 {
            return Err(ConfigError::Invalid(
                "runtime.persistent_scratch_mib must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Finds the configuration file to load, if any.
///
/// An explicit path or a path named by `PLAYGROUND_CONFIG` must exist; the
/// implicit locations are skipped when absent.
pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let user_dir = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().to_path_buf());
    locate_in(explicit, env::var_os(ENV_CONFIG), &cwd, user_dir.as_deref())
}

fn locate_in(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    cwd: &Path,
    user_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return require_file(path.to_path_buf()).map(Some);
    }

    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return require_file(PathBuf::from(value)).map(Some);
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(dir) = user_dir {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn require_file(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::Io {
            source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[window]
width = 800
height = 600
title = "Lab"
vsync = false

[programs]
root = "labs"
initial = 2

[runtime]
error_display = "1500ms"
persistent_scratch_mib = 16
compiler = "shaderc"
"#;

    #[test]
    fn parses_sample_config() {
        let config = PlaygroundConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "Lab");
        assert!(!config.window.vsync);
        assert_eq!(config.programs.root, PathBuf::from("labs"));
        assert_eq!(config.programs.extension, "comp");
        assert_eq!(config.programs.initial, 2);
        assert_eq!(config.runtime.error_display, Duration::from_millis(1500));
        assert_eq!(config.runtime.persistent_scratch_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.runtime.compiler, CompilerChoice::Shaderc);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = PlaygroundConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlaygroundConfig::default());
        assert_eq!(config.runtime.error_display, Duration::from_secs(5));
        assert_eq!(config.runtime.compiler, CompilerChoice::Naga);
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let config = PlaygroundConfig::from_toml_str("[runtime]\nerror_display = 3\n").unwrap();
        assert_eq!(config.runtime.error_display, Duration::from_secs(3));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = PlaygroundConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_sized_window() {
        let err = PlaygroundConfig::from_toml_str("[window]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_dotted_extension() {
        let err = PlaygroundConfig::from_toml_str("[programs]\nextension = \".comp\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_error_display() {
        let err = PlaygroundConfig::from_toml_str("[runtime]\nerror_display = \"0s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_compiler() {
        let err = PlaygroundConfig::from_toml_str("[runtime]\ncompiler = \"fxc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn lookup_prefers_explicit_then_env_then_cwd_then_user_dir() {
        let cwd = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        let explicit = cwd.path().join("explicit.toml");
        let from_env = cwd.path().join("env.toml");
        fs::write(&explicit, "").unwrap();
        fs::write(&from_env, "").unwrap();
        fs::write(user.path().join(CONFIG_FILE_NAME), "").unwrap();

        let found = locate_in(
            Some(&explicit),
            Some(from_env.clone().into_os_string()),
            cwd.path(),
            Some(user.path()),
        )
        .unwrap();
        assert_eq!(found, Some(explicit));

        let found = locate_in(
            None,
            Some(from_env.clone().into_os_string()),
            cwd.path(),
            Some(user.path()),
        )
        .unwrap();
        assert_eq!(found, Some(from_env));

        let found = locate_in(None, None, cwd.path(), Some(user.path())).unwrap();
        assert_eq!(found, Some(user.path().join(CONFIG_FILE_NAME)));

        fs::write(cwd.path().join(CONFIG_FILE_NAME), "").unwrap();
        let found = locate_in(None, None, cwd.path(), Some(user.path())).unwrap();
        assert_eq!(found, Some(cwd.path().join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn lookup_without_files_is_none() {
        let cwd = tempfile::tempdir().unwrap();
        assert_eq!(locate_in(None, None, cwd.path(), None).unwrap(), None);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let cwd = tempfile::tempdir().unwrap();
        let err = locate_in(
            Some(&cwd.path().join("nope.toml")),
            None,
            cwd.path(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn from_path_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();
        let config = PlaygroundConfig::from_path(&path).unwrap();
        assert_eq!(config.window.height, 600);
    }
}
