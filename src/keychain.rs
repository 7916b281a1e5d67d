use tracing::debug;

use crate::credentials::ApiCredentials;

const SERVICE: &str = "dev.trendsync";
const ACCOUNT: &str = "trendyol_supplier";

fn entry() -> Result<keyring::Entry, String> {
    keyring::Entry::new(SERVICE, ACCOUNT)
        .map_err(|e| format!("Failed to create keychain entry: {}", e))
}

/// Store credentials in the OS keychain.
pub fn keychain_set(creds: &ApiCredentials) -> Result<(), String> {
    let json = serde_json::to_string(creds).map_err(|e| e.to_string())?;
    entry()?
        .set_password(&json)
        .map_err(|e| format!("Failed to store in keychain: {}", e))?;
    debug!(supplier_id = %creds.supplier_id, "Credentials stored in keychain");
    Ok(())
}

/// Retrieve credentials from the OS keychain. Returns None if not set.
pub fn keychain_get() -> Result<Option<ApiCredentials>, String> {
    match entry()?.get_password() {
        Ok(json) => {
            let creds: ApiCredentials = serde_json::from_str(&json).map_err(|e| e.to_string())?;
            Ok(Some(creds))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(format!("Failed to read from keychain: {}", e)),
    }
}

#[cfg(test)]
fn keychain_delete() -> Result<(), String> {
    match entry()?.delete_credential() {
        Ok(()) => {
            debug!("Credentials deleted from keychain");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(format!("Failed to delete from keychain: {}", e)),
    }
}
