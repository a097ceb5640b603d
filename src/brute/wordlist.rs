use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, ScanError};
use crate::types::Credential;

/// Replaced with the paired username: `{user}123` for "admin" is `admin123`.
pub const USER_PLACEHOLDER: &str = "{user}";

/// Substitute the username into a password template.
pub fn expand_template(template: &str, username: &str) -> String {
    template.replace(USER_PLACEHOLDER, username)
}

/// Parse newline-delimited entries, skipping blank lines and `#` comments.
pub fn parse_wordlist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn load_wordlist(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| ScanError::Wordlist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_wordlist(&content))
}

/// Load `path` if given, falling back to `defaults` when it is unreadable or empty.
pub fn load_or_default(path: Option<&Path>, defaults: &[&str]) -> Vec<String> {
    let builtin = || -> Vec<String> { defaults.iter().map(|s| s.to_string()).collect() };
    let Some(path) = path else {
        return builtin();
    };
    match load_wordlist(path) {
        Ok(entries) if !entries.is_empty() => {
            debug!(path = %path.display(), entries = entries.len(), "loaded wordlist");
            entries
        }
        Ok(_) => {
            warn!(path = %path.display(), "wordlist is empty, using built-in list");
            builtin()
        }
        Err(e) => {
            warn!(error = %e, "using built-in list");
            builtin()
        }
    }
}

/// Usernames and password templates for one protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub users: Vec<String>,
    pub passwords: Vec<String>,
}

impl Dictionary {
    pub fn new<U, P>(users: U, passwords: P) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            passwords: passwords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(
        users_file: Option<&Path>,
        passwords_file: Option<&Path>,
        default_users: &[&str],
        default_passwords: &[&str],
    ) -> Self {
        Self {
            users: load_or_default(users_file, default_users),
            passwords: load_or_default(passwords_file, default_passwords),
        }
    }

    /// Attempts planned against one target.
    pub fn size(&self) -> u64 {
        self.users.len() as u64 * self.passwords.len() as u64
    }

    /// Expanded passwords for one username, optionally shortest first.
    ///
    /// The sort is stable so equal-length entries keep dictionary order.
    pub fn passwords_for(&self, username: &str, shortest_first: bool) -> Vec<String> {
        let mut out: Vec<String> = self
            .passwords
            .iter()
            .map(|template| expand_template(template, username))
            .collect();
        if shortest_first {
            out.sort_by_key(|p| p.chars().count());
        }
        out
    }

    /// Every credential in attempt order: usernames in order, then their passwords.
    pub fn plan(&self, shortest_first: bool) -> Vec<Credential> {
        self.users
            .iter()
            .flat_map(|user| {
                self.passwords_for(user, shortest_first)
                    .into_iter()
                    .map(move |password| Credential::new(user.clone(), password))
            })
            .collect()
    }
}
