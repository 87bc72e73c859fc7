// Credential vault: credentials live only for the duration of one scrape and are zeroed on drop.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::model::Airline;

/// Crew portal login for one pilot. Never cached, never logged.
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
    airline: Airline,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, airline: Airline) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: Zeroizing::new(password.into()),
            airline,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }

    pub fn airline(&self) -> Airline {
        self.airline
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("airline", &self.airline)
            .finish()
    }
}

/// Tracks how many credential sets are currently held by running scrapes.
#[derive(Debug, Default)]
pub struct CredentialVault {
    held: AtomicUsize,
}

impl CredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `credentials` for one scrape. They are released
    /// (and the password zeroed) when the lease is dropped.
    pub fn lease(self: &Arc<Self>, credentials: Credentials) -> CredentialLease {
        self.held.fetch_add(1, Ordering::Relaxed);
        CredentialLease {
            credentials,
            vault: Arc::clone(self),
        }
    }

    pub fn held(&self) -> usize {
        self.held.load(Ordering::Relaxed)
    }
}

pub struct CredentialLease {
    credentials: Credentials,
    vault: Arc<CredentialVault>,
}

impl Deref for CredentialLease {
    type Target = Credentials;

    fn deref(&self) -> &Credentials {
        &self.credentials
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.vault.held.fetch_sub(1, Ordering::Relaxed);
    }
}
