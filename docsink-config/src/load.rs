use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Default configuration directory, relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Environment variable that overrides [`CONFIGURATION_DIR`].
const CONFIGURATION_DIR_ENV_NAME: &str = "APP_CONFIGURATION_DIR";

const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable overrides, e.g. `APP_SINK__NAMESPACE`.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys in environment variable overrides.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Trait implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose values should be parsed as lists when read from environment variables.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),
}

/// Loads the layered configuration of the running service.
///
/// Reads `base.(yaml|yml|json)` and `{environment}.(yaml|yml|json)` from the configuration
/// directory (`./configuration`, or the directory named by `APP_CONFIGURATION_DIR`) and then
/// applies `APP_`-prefixed environment variable overrides. Nested keys use double underscores
/// (`APP_SINK__DEBUG=true`).
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let configuration_directory = match std::env::var_os(CONFIGURATION_DIR_ENV_NAME) {
        Some(directory) => PathBuf::from(directory),
        None => std::env::current_dir()
            .map_err(LoadConfigError::CurrentDir)?
            .join(CONFIGURATION_DIR),
    };

    let environment = Environment::load()?;

    load_config_from(&configuration_directory, environment)
}

/// Loads the layered configuration from an explicit directory and environment.
pub fn load_config_from<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(configuration_directory, ConfigFileKind::Base)?;
    let environment_file = find_configuration_file(
        configuration_directory,
        ConfigFileKind::Environment(environment),
    )?;

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source.list_separator(LIST_SEPARATOR);
        for key in T::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let builder = config::Config::builder().add_source(config::File::from(base_file.clone()));
    validate_configuration_source(&builder, ConfigFileKind::Base, &base_file)?;

    let builder = builder.add_source(config::File::from(environment_file.clone()));
    validate_configuration_source(
        &builder,
        ConfigFileKind::Environment(environment),
        &environment_file,
    )?;

    builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();

    let attempted_paths = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .collect::<Vec<_>>();

    if let Some(path) = attempted_paths.iter().find(|path| path.is_file()) {
        return Ok(path.clone());
    }

    let attempted = attempted_paths
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the configuration accumulated so far to pinpoint which file fails to parse.
fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        name: String,
        retries: u32,
    }

    impl Config for TestConfig {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    fn scratch_dir(test_name: &str) -> PathBuf {
        let directory = std::env::temp_dir().join(format!(
            "docsink-config-{test_name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&directory);
        fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let directory = scratch_dir("override");
        fs::write(directory.join("base.yaml"), "name: base\nretries: 1\n").unwrap();
        fs::write(directory.join("prod.json"), r#"{"retries": 5}"#).unwrap();

        let config: TestConfig = load_config_from(&directory, Environment::Prod).unwrap();

        assert_eq!(config.name, "base");
        assert_eq!(config.retries, 5);
    }

    #[test]
    fn missing_environment_file_lists_attempted_paths() {
        let directory = scratch_dir("missing");
        fs::write(directory.join("base.yaml"), "name: base\nretries: 1\n").unwrap();

        let err = load_config_from::<TestConfig>(&directory, Environment::Dev).unwrap_err();

        let LoadConfigError::ConfigurationFileMissing { attempted, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert!(attempted.contains("dev.yaml"));
        assert!(attempted.contains("dev.json"));
    }

    #[test]
    fn missing_directory_is_reported() {
        let directory = std::env::temp_dir().join("docsink-config-does-not-exist");

        let err = load_config_from::<TestConfig>(&directory, Environment::Dev).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::MissingConfigurationDirectory(_)
        ));
    }
}
