//! Resolution of the `cache.dir` setting.

use std::env::VarError;
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Cache location when `cache.dir` is absent, relative to the config file.
pub(crate) const DEFAULT_CACHE_DIR: &str = ".textpress/cache";

/// Resolve `cache.dir` against `config_dir` using the process environment.
pub(crate) fn resolve(configured: Option<&str>, config_dir: &Path) -> Result<PathBuf, ConfigError> {
    resolve_with(configured, config_dir, |name| std::env::var(name).ok())
}

/// Resolve `cache.dir`, reading variables through `env`.
///
/// `$VAR`, `${VAR}` and `${VAR:-default}` are substituted and a leading `~`
/// stands for `$HOME`; `$$` is a literal dollar. Relative results are joined
/// onto `config_dir`. An empty value resolves to an empty path, which
/// validation rejects.
fn resolve_with<F>(
    configured: Option<&str>,
    config_dir: &Path,
    env: F,
) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = configured else {
        return Ok(config_dir.join(DEFAULT_CACHE_DIR));
    };
    let expanded = shellexpand::full_with_context(
        raw,
        || env("HOME"),
        |name| env(name).map(Some).ok_or(VarError::NotPresent),
    )
    .map_err(|err| ConfigError::EnvVar {
        field: "cache.dir".to_owned(),
        message: format!("${} is not set", err.var_name),
    })?;
    if expanded.is_empty() {
        return Ok(PathBuf::new());
    }
    Ok(config_dir.join(&*expanded))
}
