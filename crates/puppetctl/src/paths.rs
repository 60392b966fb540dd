//! Resolves puppetctl's configuration directory, honouring an environment override so
//! tests and packaged installs can point the tool somewhere else.
//!
//! Types:
//!
//! - `AppPaths` captures the resolved configuration directory.
//!
//! Functions:
//!
//! - `AppPaths::discover` checks the environment and platform defaults.
//! - `AppPaths::stage_file` is the stage config used when none is given on the command line.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "PUPPETCTL_CONFIG_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "puppet-stage";
const APPLICATION: &str = "puppetctl";
const STAGE_FILE: &str = "stage.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        if let Some(dir) = env_directory(ENV_CONFIG_DIR) {
            return Ok(Self { config_dir: dir });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: project_dirs.config_dir().to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn stage_file(&self) -> PathBuf {
        self.config_dir.join(STAGE_FILE)
    }
}

fn env_directory(key: &str) -> Option<PathBuf> {
    let value = env::var_os(key)?;
    if value.is_empty() {
        return None;
    }
    Some(expand_home(PathBuf::from(value)))
}

fn expand_home(path: PathBuf) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path;
    };
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        let Some(home) = env::var_os("HOME") else {
            return;
        };
        let expanded = expand_home(PathBuf::from("~/stages"));
        assert_eq!(expanded, PathBuf::from(home).join("stages"));
        assert_eq!(
            expand_home(PathBuf::from("/etc/puppetctl")),
            PathBuf::from("/etc/puppetctl")
        );
    }

    #[test]
    fn stage_file_lives_in_config_dir() {
        let paths = AppPaths {
            config_dir: PathBuf::from("/tmp/puppetctl"),
        };
        assert_eq!(paths.stage_file(), PathBuf::from("/tmp/puppetctl/stage.toml"));
    }
}
