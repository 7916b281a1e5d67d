use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{keys, LocalStore};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    pub supplier_id: String,
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn demo() -> Self {
        Self {
            supplier_id: "demo_supplier".to_string(),
            api_key: "demo_key".to_string(),
            api_secret: "demo_secret".to_string(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == "demo_key"
    }

    fn is_complete(&self) -> bool {
        !self.supplier_id.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Keychain,
    LocalStore,
    Environment,
    Demo,
}

/// Credentials read from `TRENDYOL_SUPPLIER_ID`, `TRENDYOL_API_KEY`, `TRENDYOL_API_SECRET`.
pub fn credentials_from_lookup<F>(lookup: F) -> Option<ApiCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let creds = ApiCredentials {
        supplier_id: lookup("TRENDYOL_SUPPLIER_ID")?,
        api_key: lookup("TRENDYOL_API_KEY")?,
        api_secret: lookup("TRENDYOL_API_SECRET")?,
    };
    creds.is_complete().then_some(creds)
}

pub fn credentials_set_store(store: &LocalStore, creds: &ApiCredentials) -> Result<(), String> {
    store
        .set_json(keys::API_CREDENTIALS, creds)
        .map_err(|e| e.to_string())
}

pub fn credentials_get_store(store: &LocalStore) -> Result<Option<ApiCredentials>, String> {
    store
        .get_json::<ApiCredentials>(keys::API_CREDENTIALS)
        .map(|c| c.filter(ApiCredentials::is_complete))
        .map_err(|e| e.to_string())
}

/// Resolution chain used at startup and after an authentication failure.
pub struct CredentialResolver {
    store: LocalStore,
    use_keychain: bool,
    env: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
}

impl CredentialResolver {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            use_keychain: true,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Resolver without keychain access and with a fixed environment, for tests and headless hosts.
    pub fn with_lookup<F>(store: LocalStore, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            store,
            use_keychain: false,
            env: Box::new(lookup),
        }
    }

    /// Keychain first, then local store, then environment, then demo placeholders.
    pub fn resolve(&self) -> (ApiCredentials, CredentialSource) {
        if self.use_keychain {
            match crate::keychain::keychain_get() {
                Ok(Some(creds)) if creds.is_complete() => {
                    return (creds, CredentialSource::Keychain)
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Keychain read failed, falling back to local store"),
            }
        }
        match credentials_get_store(&self.store) {
            Ok(Some(creds)) => return (creds, CredentialSource::LocalStore),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Stored credentials unreadable"),
        }
        if let Some(creds) = credentials_from_lookup(|k| (self.env)(k)) {
            return (creds, CredentialSource::Environment);
        }
        debug!("No credentials configured, using demo placeholders");
        (ApiCredentials::demo(), CredentialSource::Demo)
    }

    /// Persist `creds` where the next `resolve` finds them first. A keychain
    /// write removes the local store copy; without a keychain the local store
    /// holds them.
    pub fn remember(&self, creds: &ApiCredentials) -> Result<CredentialSource, String> {
        if self.use_keychain {
            match crate::keychain::keychain_set(creds) {
                Ok(()) => {
                    if let Err(e) = self.store.delete(keys::API_CREDENTIALS) {
                        warn!(error = %e, "Could not clear stored credentials after keychain write");
                    }
                    return Ok(CredentialSource::Keychain);
                }
                Err(e) => warn!(error = %e, "Keychain write failed, falling back to local store"),
            }
        }
        credentials_set_store(&self.store, creds)?;
        Ok(CredentialSource::LocalStore)
    }
}
