//! # Master Password Handling
//!
//! RDS never returns the master password, so the controller keeps the last
//! password it successfully sent in a controller-owned secret named
//! `<kind>.<uid>` in the controller namespace. Comparing the user's desired
//! password against that cache is the only way to detect a change.
//!
//! The cache also carries a restore state. A resource created from a
//! snapshot or S3 backup keeps the source's password, so the first Observe
//! after the restore reports the password as out of date exactly once,
//! forcing a Modify with the user's password.

use crate::constants::{CACHE_KEY_PASSWORD, CACHE_KEY_RESTORE_STATE, GENERATED_PASSWORD_LENGTH};
use crate::crd::{Managed, SecretKeySelector};
use crate::managed::ExternalError;
use crate::store::{SecretData, SecretStore};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Restore state of a freshly restored instance or cluster
pub const RESTORE_STATE_RESTORED: &str = "Restored";
/// Restore state once the user's password has been applied
pub const RESTORE_STATE_NORMAL: &str = "Normal";

/// Characters allowed in generated passwords: printable ASCII without
/// space, `"`, `/` and `@`, which RDS rejects
fn password_alphabet() -> Vec<char> {
    ('!'..='~')
        .filter(|c| !matches!(c, '"' | '/' | '@'))
        .collect()
}

/// Generate a random master password
#[must_use]
pub fn generate_password(length: usize) -> Zeroizing<String> {
    let alphabet = password_alphabet();
    let mut rng = rand::thread_rng();
    let password: String = (0..length)
        .filter_map(|_| alphabet.choose(&mut rng).copied())
        .collect();
    Zeroizing::new(password)
}

fn secret_error(selector: &SecretKeySelector, message: impl Into<String>) -> ExternalError {
    ExternalError::Secret {
        namespace: selector.namespace.clone(),
        name: selector.name.clone(),
        message: message.into(),
    }
}

/// Where the desired password comes from
#[derive(Debug, Clone, Copy)]
pub struct PasswordSource<'a> {
    pub secret_ref: Option<&'a SecretKeySelector>,
    pub autogenerate: bool,
}

/// Controller-side cache of the last applied master password
pub struct PasswordCache {
    secrets: Arc<dyn SecretStore>,
    namespace: String,
}

impl std::fmt::Debug for PasswordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PasswordCache {
    pub fn new(secrets: Arc<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            secrets,
            namespace: namespace.into(),
        }
    }

    /// Name of the cache secret for a resource
    pub fn secret_name<R: Managed>(cr: &R) -> Result<String, ExternalError> {
        let uid = cr
            .meta()
            .uid
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ExternalError::validation("resource has no uid; cannot cache its password"))?;
        Ok(format!("{}.{}", R::kind_name().to_lowercase(), uid))
    }

    async fn entries<R: Managed>(&self, cr: &R) -> Result<SecretData, ExternalError> {
        let name = Self::secret_name(cr)?;
        Ok(self.secrets.get(&self.namespace, &name).await?.unwrap_or_default())
    }

    /// The last password sent to AWS; empty when none was cached
    pub async fn cached_password<R: Managed>(&self, cr: &R) -> Result<Zeroizing<String>, ExternalError> {
        let entries = self.entries(cr).await?;
        Ok(Zeroizing::new(
            entries
                .get(CACHE_KEY_PASSWORD)
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default(),
        ))
    }

    pub async fn restore_state<R: Managed>(&self, cr: &R) -> Result<Option<String>, ExternalError> {
        let entries = self.entries(cr).await?;
        Ok(entries
            .get(CACHE_KEY_RESTORE_STATE)
            .map(|v| String::from_utf8_lossy(v).into_owned()))
    }

    /// The password the user wants.
    ///
    /// With `autogenerate` set and the referenced key missing or empty, a
    /// password is generated and written back to the user's secret so later
    /// reconciles read the same value.
    pub async fn desired_password(
        &self,
        source: PasswordSource<'_>,
    ) -> Result<Option<Zeroizing<String>>, ExternalError> {
        let Some(selector) = source.secret_ref else {
            return Ok(None);
        };
        let existing = self.secrets.get(&selector.namespace, &selector.name).await?;
        let current = existing
            .as_ref()
            .and_then(|data| data.get(&selector.key))
            .map(|v| Zeroizing::new(String::from_utf8_lossy(v).into_owned()))
            .filter(|v| !v.is_empty());
        if let Some(password) = current {
            return Ok(Some(password));
        }
        if !source.autogenerate {
            return Err(match existing {
                None => secret_error(selector, "secret not found"),
                Some(_) => secret_error(selector, format!("key {} not found", selector.key)),
            });
        }

        let password = generate_password(GENERATED_PASSWORD_LENGTH);
        let mut data = existing.unwrap_or_default();
        data.insert(selector.key.clone(), password.as_bytes().to_vec());
        self.secrets
            .apply(&selector.namespace, &selector.name, &data)
            .await?;
        info!(
            "Generated master password into secret {}/{} (key {})",
            selector.namespace, selector.name, selector.key
        );
        Ok(Some(password))
    }

    /// Whether the password AWS holds is the one the user wants
    pub async fn password_up_to_date<R: Managed>(
        &self,
        cr: &R,
        source: PasswordSource<'_>,
    ) -> Result<bool, ExternalError> {
        let cached = self.cached_password(cr).await?;
        if self.restore_state(cr).await?.as_deref() == Some(RESTORE_STATE_RESTORED) && !cached.is_empty() {
            debug!("Restored from backup; master password must be re-applied");
            return Ok(false);
        }
        let desired = self.desired_password(source).await?;
        let desired = desired.as_ref().map_or("", |p| p.as_str());
        Ok(desired == cached.as_str())
    }

    /// Record the password just sent to AWS
    pub async fn cache<R: Managed>(
        &self,
        cr: &R,
        password: Option<&str>,
        restore_state: &str,
    ) -> Result<(), ExternalError> {
        let name = Self::secret_name(cr)?;
        let mut data = SecretData::new();
        data.insert(
            CACHE_KEY_PASSWORD.to_string(),
            password.unwrap_or_default().as_bytes().to_vec(),
        );
        data.insert(
            CACHE_KEY_RESTORE_STATE.to_string(),
            restore_state.as_bytes().to_vec(),
        );
        self.secrets.apply(&self.namespace, &name, &data).await?;
        Ok(())
    }

    pub async fn delete_cache<R: Managed>(&self, cr: &R) -> Result<(), ExternalError> {
        let name = Self::secret_name(cr)?;
        match self.secrets.delete(&self.namespace, &name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
