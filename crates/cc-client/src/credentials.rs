//! OAuth1 credential discovery.
//!
//! Credentials are looked up from the environment, then from the
//! clever-tools configuration file. Consumer key and secret are optional in
//! both sources; the client fills them from its configured default consumer.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::OAuth1Config;

/// Environment variable holding the OAuth1 access token.
pub const ENV_OAUTH_TOKEN: &str = "CC_OAUTH_TOKEN";
/// Environment variable holding the OAuth1 access secret.
pub const ENV_OAUTH_SECRET: &str = "CC_OAUTH_SECRET";
/// Environment variable holding the OAuth1 consumer key.
pub const ENV_CONSUMER_KEY: &str = "CC_CONSUMER_KEY";
/// Environment variable holding the OAuth1 consumer secret.
pub const ENV_CONSUMER_SECRET: &str = "CC_CONSUMER_SECRET";

/// Location of the clever-tools configuration, relative to the user config
/// directory.
const CONFIG_FILE: &str = "clever-cloud/clever-tools.json";

/// OAuth1 credentials found by a [`CredentialProvider`].
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth1Credentials {
    pub access_token: String,
    pub access_secret: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
}

impl OAuth1Credentials {
    /// Build an OAuth1 config, using the default consumer where these
    /// credentials carry none.
    pub fn into_config(self, default_key: &str, default_secret: &str) -> OAuth1Config {
        OAuth1Config::new(
            self.consumer_key.unwrap_or_else(|| default_key.to_string()),
            self.consumer_secret
                .unwrap_or_else(|| default_secret.to_string()),
            self.access_token,
            self.access_secret,
        )
    }
}

impl fmt::Debug for OAuth1Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth1Credentials")
            .field("access_token", &"<redacted>")
            .field("access_secret", &"<redacted>")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &self.consumer_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A source of OAuth1 user credentials.
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The credentials, or `None` if this source has none.
    fn oauth1_credentials(&self) -> Option<OAuth1Credentials>;
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `CC_OAUTH_TOKEN` and `CC_OAUTH_SECRET` (both required) plus the
/// optional `CC_CONSUMER_KEY` and `CC_CONSUMER_SECRET`.
///
/// Empty variables count as unset.
#[derive(Clone)]
pub struct EnvCredentialProvider {
    lookup: Lookup,
}

impl EnvCredentialProvider {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider").finish_non_exhaustive()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn oauth1_credentials(&self) -> Option<OAuth1Credentials> {
        let (Some(access_token), Some(access_secret)) =
            (self.var(ENV_OAUTH_TOKEN), self.var(ENV_OAUTH_SECRET))
        else {
            debug!("OAuth1 user env vars are not set");
            return None;
        };

        Some(OAuth1Credentials {
            access_token,
            access_secret,
            consumer_key: self.var(ENV_CONSUMER_KEY),
            consumer_secret: self.var(ENV_CONSUMER_SECRET),
        })
    }
}

// ---------------------------------------------------------------------------
// Configuration file
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    token: String,
    #[serde(default)]
    secret: String,
}

/// Reads `{"token": "...", "secret": "..."}` from the clever-tools
/// configuration file.
///
/// The first existing file among the XDG config locations wins:
/// `$XDG_CONFIG_HOME` (default `~/.config`), then each entry of
/// `$XDG_CONFIG_DIRS` (default `/etc/xdg`).
#[derive(Clone, Debug)]
pub struct ConfigFileCredentialProvider {
    candidates: Vec<PathBuf>,
}

impl ConfigFileCredentialProvider {
    /// Search the XDG config locations of the current user.
    pub fn new() -> Self {
        Self {
            candidates: search_paths(
                std::env::var_os("XDG_CONFIG_HOME"),
                std::env::var_os("XDG_CONFIG_DIRS"),
                home::home_dir(),
            ),
        }
    }

    /// Read from an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            candidates: vec![path.into()],
        }
    }

    /// The file this provider reads, if one exists.
    pub fn path(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .map(PathBuf::as_path)
            .find(|path| path.is_file())
    }
}

impl Default for ConfigFileCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate config files, most specific first. Relative directories are
/// ignored.
fn search_paths(
    config_home: Option<OsString>,
    config_dirs: Option<OsString>,
    home: Option<PathBuf>,
) -> Vec<PathBuf> {
    let config_home = config_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|home| home.join(".config")));
    let config_dirs: Vec<PathBuf> = match config_dirs.filter(|dirs| !dirs.is_empty()) {
        Some(dirs) => std::env::split_paths(&dirs).collect(),
        None => vec![PathBuf::from("/etc/xdg")],
    };

    config_home
        .into_iter()
        .chain(config_dirs)
        .filter(|dir| dir.is_absolute())
        .map(|dir| dir.join(CONFIG_FILE))
        .collect()
}

impl CredentialProvider for ConfigFileCredentialProvider {
    fn name(&self) -> &'static str {
        "config file"
    }

    fn oauth1_credentials(&self) -> Option<OAuth1Credentials> {
        let Some(path) = self.path() else {
            debug!(searched = self.candidates.len(), "no user configuration file");
            return None;
        };
        debug!(path = %path.display(), "reading OAuth1 credentials from config file");

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read user config file");
                return None;
            }
        };
        let file: ConfigFile = match serde_json::from_slice(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot parse user config file");
                return None;
            }
        };

        if file.token.is_empty() || file.secret.is_empty() {
            debug!(path = %path.display(), "OAuth1 user config file vars are not set");
            return None;
        }

        Some(OAuth1Credentials {
            access_token: file.token,
            access_secret: file.secret,
            consumer_key: None,
            consumer_secret: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Tries each provider in order and keeps the first credentials found.
#[derive(Debug)]
pub struct ChainedCredentialProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainedCredentialProvider {
    /// Chain `providers`, first match wins.
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

impl Default for ChainedCredentialProvider {
    /// Environment first, then the clever-tools config file.
    fn default() -> Self {
        Self::new(vec![
            Box::new(EnvCredentialProvider::new()),
            Box::new(ConfigFileCredentialProvider::new()),
        ])
    }
}

impl CredentialProvider for ChainedCredentialProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn oauth1_credentials(&self) -> Option<OAuth1Credentials> {
        self.providers.iter().find_map(|provider| {
            let credentials = provider.oauth1_credentials()?;
            info!(source = provider.name(), "using OAuth1 user credentials");
            Some(credentials)
        })
    }
}
