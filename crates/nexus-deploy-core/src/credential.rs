//! Secret written to password prompts.

use std::fmt;

use zeroize::Zeroizing;

/// Environment variable consulted for the deploy password.
pub const PASSWORD_ENV: &str = "NEXUS_DEPLOY_PASSWORD";

/// Password fed to ssh/sudo prompts.
///
/// The backing buffer is wiped on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct Credential {
    secret: Zeroizing<String>,
}

impl Credential {
    /// Wrap a secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Read the credential from `NEXUS_DEPLOY_PASSWORD`, if set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(PASSWORD_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    /// Bytes to write to the terminal: the secret followed by a newline.
    #[must_use]
    pub fn response_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.secret.len() + 1);
        bytes.extend_from_slice(self.secret.as_bytes());
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }

    /// Expose the secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
