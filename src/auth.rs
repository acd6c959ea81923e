use std::fmt;

/// Session credentials, passed explicitly into every backend client.
///
/// Holding a value is the "is there a valid session" gate before
/// matchmaking or a chat room; issuing and refreshing tokens belongs to
/// the authentication collaborator, not this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into() }
    }

    pub(crate) fn token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credentials {
    // Tokens stay out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("access_token", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_the_token() {
        let credentials = Credentials::bearer("secret-token");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-token"));
        assert_eq!(credentials.token(), "secret-token");
    }
}
