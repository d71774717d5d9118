//! Login credentials bound to a session.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Principal, secret and optional privilege secret used to log in.
///
/// Compared by value so a session can detect credential rotation.
/// `Debug` never prints secrets; use [`Credential::fingerprint`] when a
/// credential has to be identified in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Credential {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub enable_password: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            enable_password: None,
        }
    }

    pub fn with_enable_password(mut self, enable_password: impl Into<String>) -> Self {
        self.enable_password = Some(enable_password.into());
        self
    }

    /// Short SHA-256 digest over all fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.password.as_bytes());
        hasher.update([0u8]);
        if let Some(enable) = self.enable_password.as_ref() {
            hasher.update(enable.as_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();
        digest[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "enable_password",
                &self.enable_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Fingerprint for an optional credential, for log lines.
pub(crate) fn describe(credential: Option<&Credential>) -> String {
    match credential {
        Some(c) => format!("{}#{}", c.username, c.fingerprint()),
        None => "<none>".to_string(),
    }
}
