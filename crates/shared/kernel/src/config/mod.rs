use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

#[plm_derive::plm_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Prefix of environment overrides, e.g. `PLM__SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "PLM";

/// Loads `T` from a config file (default `server`, any format the `config` crate knows)
/// overlaid with `PLM__`-prefixed environment variables. Nested keys use `__`.
///
/// The file is optional when `required` is false, which lets a server start on defaults
/// plus environment alone.
///
/// # Errors
/// [`ConfigError::Config`] when the file is required and missing, or the merged values do
/// not deserialize into `T`.
///
/// ```rust
/// use plm_kernel::config::load_config_with;
///
/// #[derive(Default, serde::Deserialize)]
/// struct AppConfig {
///     #[serde(default)]
///     port: u16,
/// }
///
/// let cfg: AppConfig = load_config_with(Some("does-not-exist"), false).unwrap_or_default();
/// assert_eq!(cfg.port, 0);
/// ```
pub fn load_config_with<T>(path: Option<impl AsRef<Path>>, required: bool) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let effective_path = path.map_or_else(|| PathBuf::from("server"), |p| p.as_ref().to_path_buf());

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake)
                .try_parsing(true),
        );

    info!(path = %effective_path.display(), required, "Loading config");

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}

/// [`load_config_with`] with a required file.
///
/// # Errors
/// See [`load_config_with`].
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    load_config_with(path, true)
}
