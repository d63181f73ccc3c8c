//! ---
//! trk_section: "01-core-functionality"
//! trk_subsection: "module"
//! trk_type: "source"
//! trk_scope: "code"
//! trk_description: "Shared primitives and utilities for the tracking runtime."
//! trk_version: "v0.0.0-prealpha"
//! trk_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Identity attached to a session, as issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Explicit session context owned by the application shell and passed to
/// every component that talks to the backend. There is deliberately no
/// ambient global here: callers construct one, load it, and hand it down.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionContext {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

impl SessionContext {
    /// An unauthenticated session, suitable for public order tracking views.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session carrying a bearer token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            user: None,
        }
    }

    /// Load a persisted session from disk (TOML).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("unable to read session file {}", path.as_ref().display())
        })?;
        toml::from_str(&contents).with_context(|| {
            format!("failed to parse session file {}", path.as_ref().display())
        })
    }

    /// `Authorization` header value, when a token is present.
    pub fn bearer_header(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn anonymous_session_has_no_bearer() {
        let session = SessionContext::anonymous();
        assert!(!session.is_authenticated());
        assert_eq!(session.bearer_header(), None);
    }

    #[test]
    fn token_session_formats_bearer_header() {
        let session = SessionContext::with_token("abc123");
        assert_eq!(session.bearer_header().as_deref(), Some("Bearer abc123"));
    }

    #[test]
    fn loads_session_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "token = \"tok\"\n[user]\nname = \"A\"\nemail = \"a@example.com\"\nrole = \"agent\""
        )
        .expect("write");
        let session = SessionContext::load(file.path()).expect("loads");
        assert_eq!(session.token.as_deref(), Some("tok"));
        assert_eq!(session.user.expect("user").role, "agent");
    }
}
