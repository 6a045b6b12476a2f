use std::path::PathBuf;

use crate::error::StartupError;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub bind_address: String,
    pub admin: Option<AdminAccount>,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or(StartupError::MissingVariable(key))
        };

        let admin = match (lookup("ADMIN_LOGIN"), lookup("ADMIN_PASSWORD")) {
            (Some(login), Some(password)) if !login.is_empty() && !password.is_empty() => {
                Some(AdminAccount { login, password })
            }
            _ => None,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            upload_dir: PathBuf::from(required("UPLOAD_DIR")?),
            storage_dir: PathBuf::from(required("STORAGE_DIR")?),
            bind_address: lookup("BIND_ADDRESS")
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_required_variables_and_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "share.db"),
            ("UPLOAD_DIR", "/tmp/uploads"),
            ("STORAGE_DIR", "/tmp/storage"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "share.db");
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/storage"));
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(config.admin.is_none());
    }

    #[test]
    fn missing_storage_dir_is_reported() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "share.db"),
            ("UPLOAD_DIR", "/tmp/uploads"),
        ]));
        assert!(matches!(
            result,
            Err(StartupError::MissingVariable("STORAGE_DIR"))
        ));
    }

    #[test]
    fn admin_requires_both_login_and_password() {
        let base = [
            ("DATABASE_URL", "share.db"),
            ("UPLOAD_DIR", "/u"),
            ("STORAGE_DIR", "/s"),
            ("ADMIN_LOGIN", "admin"),
        ];
        assert!(Config::from_lookup(lookup_from(&base))
            .unwrap()
            .admin
            .is_none());

        let mut with_password = base.to_vec();
        with_password.push(("ADMIN_PASSWORD", "hunter2"));
        let admin = Config::from_lookup(lookup_from(&with_password))
            .unwrap()
            .admin
            .unwrap();
        assert_eq!(admin.login, "admin");
        assert_eq!(admin.password, "hunter2");
    }
}
