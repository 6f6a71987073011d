//! Session bootstrap: turns connect credentials into a backend URL.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use dbridge_core::ConnectRequest;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{BridgeError, BridgeResult};

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEntry {
    pub url: Option<String>,
    /// Argon2 PHC string, checked when authentication is required.
    pub password_hash: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub require_auth: bool,
    pub default_url: Option<String>,
    /// Short names usable in place of a full URL.
    pub aliases: BTreeMap<String, String>,
    pub users: BTreeMap<String, UserEntry>,
}

/// Where a session connects and on whose behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTarget {
    pub url: String,
    pub subject: String,
    pub properties: BTreeMap<String, String>,
}

pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, request: &ConnectRequest) -> BridgeResult<ConnectionTarget>;
}

pub struct ConfigResolver {
    config: BootstrapConfig,
}

impl ConfigResolver {
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    fn authenticate(&self, subject: &str, entry: Option<&UserEntry>, password: &str) -> BridgeResult<()> {
        let hash = entry
            .and_then(|e| e.password_hash.as_deref())
            .ok_or_else(|| BridgeError::LoginFailure(format!("unknown user '{}'", subject)))?;
        if !verify_password(password, hash) {
            tracing::warn!("Rejected login for '{}'", subject);
            return Err(BridgeError::LoginFailure(format!(
                "invalid credentials for '{}'",
                subject
            )));
        }
        Ok(())
    }
}

impl CredentialResolver for ConfigResolver {
    fn resolve(&self, request: &ConnectRequest) -> BridgeResult<ConnectionTarget> {
        let subject = request.user.clone().unwrap_or_else(|| ANONYMOUS.to_string());
        let entry = request.user.as_ref().and_then(|u| self.config.users.get(u));

        if self.config.require_auth {
            self.authenticate(&subject, entry, request.password.as_deref().unwrap_or(""))?;
        }

        let requested = request
            .url
            .clone()
            .or_else(|| entry.and_then(|e| e.url.clone()))
            .or_else(|| self.config.default_url.clone())
            .ok_or_else(|| BridgeError::UnmappedUser(subject.clone()))?;
        let resolved = self
            .config
            .aliases
            .get(&requested)
            .cloned()
            .unwrap_or(requested);

        let (url, mut properties) = split_properties(&resolved);
        if let Some(entry) = entry {
            for (k, v) in &entry.properties {
                properties.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        properties.extend(request.properties.clone());

        Ok(ConnectionTarget {
            url,
            subject,
            properties,
        })
    }
}

/// Splits `url#key=value&key=value` into the URL and its properties.
pub fn split_properties(url: &str) -> (String, BTreeMap<String, String>) {
    let mut properties = BTreeMap::new();
    let Some((base, query)) = url.split_once('#') else {
        return (url.to_string(), properties);
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        properties.insert(k.to_string(), v.to_string());
    }
    (base.to_string(), properties)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn hash_password(password: &str) -> BridgeResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BridgeError::Internal(format!("Hashing error: {}", e)))
}
