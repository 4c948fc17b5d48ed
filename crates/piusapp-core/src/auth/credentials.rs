use std::fmt;

use anyhow::{Context, Result};
use keyring::Entry;
use sha1::{Digest, Sha1};

const SERVICE_NAME: &str = "piusapp";

/// Backend login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// SHA-1 of `username ++ password` (no separator) as lowercase hex.
    ///
    /// The backend stores this with the device token so it can stop pushing
    /// once the school revokes the login. Always 40 digits: leading zeros
    /// are kept, unlike the shortened form older mobile clients sent.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.username.as_bytes());
        hasher.update(self.password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

pub struct CredentialStore;

impl CredentialStore {
    /// Store username and password in the OS keychain
    pub fn store(username: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, username)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve password for a username from the OS keychain
    pub fn get_password(username: &str) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, username)
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete stored credentials for a username
    pub fn delete(username: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, username)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    /// Load the full credentials for a username, if a password is stored
    pub fn load(username: &str) -> Option<Credentials> {
        Self::get_password(username)
            .ok()
            .map(|password| Credentials::new(username, password))
    }
}
