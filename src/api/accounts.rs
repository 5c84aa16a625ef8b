//! Purpose: Load per-account credentials and bearer allowlists once, then serve read-only lookups.
//! Exports: `AccountStore`, `Account`, `ServiceAccountKey`, `default_accounts_dir`.
//! Role: Explicitly passed account registry; the transformation core never touches the filesystem.
//! Invariants: The store is immutable after `load`; lookups never hit the filesystem.
//! Invariants: Account names are non-empty ASCII alphanumeric (no path traversal).
//! Invariants: Authorization is checked before credentials are resolved.
//! Invariants: Unauthorized errors never reveal whether an account has an allowlist.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};

use super::ApiResult;

const CREDENTIALS_SUFFIX: &str = ".json";
const ALLOWLIST_SUFFIX: &str = ".auth.json";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

pub fn default_accounts_dir() -> PathBuf {
    PathBuf::from("accounts")
}

/// Google service-account key file (`{account}.json`).
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct AllowlistFile {
    #[serde(rename = "Authorization")]
    authorization: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Account {
    name: String,
    key: Arc<ServiceAccountKey>,
}

impl Account {
    pub fn new(name: impl Into<String>, key: ServiceAccountKey) -> Self {
        Self {
            name: name.into(),
            key: Arc::new(key),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }
}

#[derive(Clone, Debug, Default)]
pub struct AccountStore {
    accounts: BTreeMap<String, Account>,
    allowlists: BTreeMap<String, Vec<String>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `dir` for `{name}.json` and `{name}.auth.json` files.
    pub fn load(dir: impl AsRef<Path>) -> ApiResult<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("failed to read accounts directory")
                .with_path(dir)
                .with_hint("Create the directory or pass --accounts-dir.")
                .with_source(err)
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read accounts directory entry")
                    .with_path(dir)
                    .with_source(err)
            })?;
            let path = entry.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(ALLOWLIST_SUFFIX) {
                if !is_valid_account_name(name) {
                    tracing::warn!(path = %path.display(), "skipping allowlist with invalid account name");
                    continue;
                }
                let file: AllowlistFile = read_json_file(&path)?;
                store = store.with_allowlist(name, file.authorization);
            } else if let Some(name) = file_name.strip_suffix(CREDENTIALS_SUFFIX) {
                if !is_valid_account_name(name) {
                    tracing::warn!(path = %path.display(), "skipping credentials with invalid account name");
                    continue;
                }
                let key: ServiceAccountKey = read_json_file(&path)?;
                ensure_private_key(&key, &path)?;
                store = store.with_account(Account::new(name, key));
            }
        }

        tracing::info!(
            dir = %dir.display(),
            accounts = store.accounts.len(),
            allowlists = store.allowlists.len(),
            "loaded accounts"
        );
        Ok(store)
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.name.clone(), account);
        self
    }

    pub fn with_allowlist<I, S>(mut self, name: impl Into<String>, bearers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlists
            .insert(name.into(), bearers.into_iter().map(Into::into).collect());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self
            .accounts
            .keys()
            .chain(self.allowlists.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names.into_iter()
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    pub fn requires_auth(&self, name: &str) -> bool {
        self.allowlists.contains_key(name)
    }

    pub fn allowlist_len(&self, name: &str) -> usize {
        self.allowlists.get(name).map_or(0, Vec::len)
    }

    /// Checks the `Authorization` header against the account's allowlist, if it has one.
    pub fn authorize(&self, name: &str, authorization: Option<&str>) -> ApiResult<()> {
        let Some(allowed) = self.allowlists.get(name) else {
            return Ok(());
        };
        match authorization {
            Some(value) if allowed.iter().any(|entry| entry == value) => Ok(()),
            _ => Err(Error::new(ErrorKind::UnauthorizedAccount).with_message("not authorized")),
        }
    }

    /// Validates the name, authorizes the caller, then returns the account's credentials.
    pub fn resolve(&self, name: &str, authorization: Option<&str>) -> ApiResult<&Account> {
        if !is_valid_account_name(name) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("account name must be alphanumeric")
                .with_hint("Use the base name of a file in the accounts directory."));
        }
        self.authorize(name, authorization)?;
        self.accounts.get(name).ok_or_else(|| {
            Error::new(ErrorKind::UnknownAccount).with_message(format!("unknown account `{name}`"))
        })
    }
}

pub fn is_valid_account_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> ApiResult<T> {
    let bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read account file")
            .with_path(path)
            .with_source(err)
    })?;
    crate::json::parse::from_slice(&bytes).map_err(|err| {
        let hint = crate::json::parse::hint_for_error(&err, "account file");
        Error::new(ErrorKind::Corrupt)
            .with_message("malformed account file")
            .with_path(path)
            .with_hint(hint)
            .with_source(err)
    })
}

fn ensure_private_key(key: &ServiceAccountKey, path: &Path) -> ApiResult<()> {
    let mut reader = std::io::Cursor::new(key.private_key.as_bytes());
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(Error::new(ErrorKind::Corrupt)
            .with_message("service account file has no PEM private key")
            .with_path(path)),
        Err(err) => Err(Error::new(ErrorKind::Corrupt)
            .with_message("service account private key is not valid PEM")
            .with_path(path)
            .with_source(err)),
    }
}
