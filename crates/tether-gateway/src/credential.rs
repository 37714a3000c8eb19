//! Account credentials and their display form.

use std::fmt;
use std::io::Write as _;
use std::path::Path;

/// Mask a credential for display.
///
/// With `enabled`, the first `floor(2L/3)` characters are kept and every
/// remaining character becomes `*`, where `L` is the length in characters.
/// With `enabled` off the input is returned unchanged.
#[must_use]
pub fn censor(value: &str, enabled: bool) -> String {
    if !enabled {
        return value.to_owned();
    }
    let len = value.chars().count();
    let keep = len.saturating_mul(2) / 3;
    value
        .chars()
        .enumerate()
        .map(|(i, c)| if i < keep { c } else { '*' })
        .collect()
}

/// A bearer credential with optional account-recovery details.
///
/// The token is never mutated after load. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    email: Option<String>,
    password: Option<String>,
}

impl Credential {
    /// A credential with no recovery details.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: None,
            password: None,
        }
    }

    /// A credential paired with an email and password.
    #[must_use]
    pub fn with_recovery(
        token: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    /// Parse one line of a credentials file.
    ///
    /// `email:password:token` splits on the last two colons, so the email
    /// part may itself contain colons. Anything else is taken whole as the
    /// token. Returns `None` for a blank line.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut parts = line.rsplitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(password), Some(email))
                if !token.is_empty() && !password.is_empty() && !email.is_empty() =>
            {
                Some(Self::with_recovery(token, email, password))
            },
            _ => Some(Self::new(line)),
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The recovery email, if any.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The recovery password, if any.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The token as it should appear in logs.
    #[must_use]
    pub fn display_token(&self, censored: bool) -> String {
        censor(&self.token, censored)
    }

    /// The line written back to a credentials file: `email:password:token`
    /// when both recovery fields are present and non-empty, else the token.
    #[must_use]
    pub fn to_line(&self) -> String {
        match (self.email(), self.password()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                format!("{email}:{password}:{}", self.token)
            },
            _ => self.token.clone(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &censor(&self.token, true))
            .field("has_email", &self.email.is_some())
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

/// Append `credential` to the file at `path` as one line, creating the file
/// if needed.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be opened or written.
pub fn write_credential(path: &Path, credential: &Credential) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", credential.to_line())
}
