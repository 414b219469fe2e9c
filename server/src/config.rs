use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::store::OwnershipPolicy;

const DB_FILE: &str = "fshare.db";
const CURRENT_DIR: &str = "./";
const UPLOADS_DIR: &str = "uploads";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ADMIN: &str = "admin";
const MAX_UPLOAD: usize = 2 * 1024 * 1024 * 1024; /* 2GB */

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("invalid password hashing cost: {0}")]
    PasswordCost(argon2::Error),
}

/// Argon2id cost. Defaults match the `argon2` crate recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl PasswordCost {
    pub fn params(&self) -> Result<argon2::Params, ConfigError> {
        argon2::Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(ConfigError::PasswordCost)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub upload_dir: PathBuf,
    pub port: u16,
    /// Bootstrap admin identities. These accounts cannot be deleted.
    pub admins: Vec<String>,
    /// When set, missing bootstrap admins are created with this password on start
    pub admin_password: Option<String>,
    pub ownership: OwnershipPolicy,
    pub max_upload: usize,
    pub password_cost: PasswordCost,
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            upload_dir: data_dir.join(UPLOADS_DIR),
            data_dir,
            db_file: DB_FILE.to_owned(),
            port: DEFAULT_PORT,
            admins: vec![DEFAULT_ADMIN.to_owned()],
            admin_password: None,
            ownership: OwnershipPolicy::default(),
            max_upload: MAX_UPLOAD,
            password_cost: PasswordCost::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = lookup("FSHARE_DATA_DIR").unwrap_or_else(|| String::from(CURRENT_DIR));
        let mut config = Self::new(dir);

        if let Some(file) = lookup("FSHARE_DATA_FILE") {
            config.db_file = file;
        }
        if let Some(uploads) = lookup("FSHARE_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(uploads);
        }
        if let Some(port) = lookup("FSHARE_PORT") {
            config.port = parse("FSHARE_PORT", &port)?;
        }
        if let Some(admins) = lookup("FSHARE_ADMINS") {
            config.admins = admins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        config.admin_password = lookup("FSHARE_ADMIN_PASSWORD").filter(|p| !p.is_empty());
        if let Some(ownership) = lookup("FSHARE_SHARED_OWNERSHIP") {
            config.ownership = parse("FSHARE_SHARED_OWNERSHIP", &ownership)?;
        }
        if let Some(limit) = lookup("FSHARE_MAX_UPLOAD") {
            config.max_upload = parse("FSHARE_MAX_UPLOAD", &limit)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_owned(),
    })
}
