//! Persisted provider credentials and provider selection.

mod provider;
mod sqlite;
mod store;

use std::sync::{Arc, Mutex};

pub use provider::{CredentialField, ProviderId};
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, SettingsStore};

const SELECTED_PROVIDER_KEY: &str = "selected_service_provider";
const KEY_PROMPT_SHOWN_KEY: &str = "has_shown_api_key_prompt";

/// Notification sent to observers after a credential changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEvent {
    pub provider: ProviderId,
    pub field: CredentialField,
    /// The new value, `None` when the field was cleared.
    pub value: Option<String>,
}

type Observer = Box<dyn Fn(&CredentialEvent) + Send + Sync>;

struct Inner {
    store: Box<dyn SettingsStore>,
    observers: Mutex<Vec<Observer>>,
}

/// Handle to the user's credentials and provider preference.
///
/// Cloning is cheap; all clones share the same storage and observers.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    pub fn new(store: impl SettingsStore + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Opens the persisted store, falling back to memory when it is unavailable.
    pub fn open_default() -> Self {
        match crate::paths::settings_db_path().and_then(SqliteStore::open) {
            Ok(store) => Self::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "settings storage unavailable, using memory");
                Self::in_memory()
            }
        }
    }

    /// Registers a callback run after every credential change.
    pub fn on_change(&self, observer: impl Fn(&CredentialEvent) + Send + Sync + 'static) {
        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    fn notify(&self, event: &CredentialEvent) {
        if let Ok(observers) = self.inner.observers.lock() {
            for observer in observers.iter() {
                observer(event);
            }
        }
    }

    pub fn get(&self, provider: ProviderId, field: CredentialField) -> Option<String> {
        self.inner
            .store
            .get(provider.storage_key(field))
            .filter(|v| !v.trim().is_empty())
    }

    /// Stores a field; an empty value removes it.
    pub fn set(&self, provider: ProviderId, field: CredentialField, value: &str) {
        let key = provider.storage_key(field);
        let value = value.trim();
        if value.is_empty() {
            self.inner.store.remove(key);
        } else {
            self.inner.store.set(key, value);
        }
        tracing::debug!(%provider, key, present = !value.is_empty(), "credential updated");
        self.notify(&CredentialEvent {
            provider,
            field,
            value: (!value.is_empty()).then(|| value.to_string()),
        });
    }

    pub fn api_key(&self, provider: ProviderId) -> Option<String> {
        self.get(provider, CredentialField::ApiKey)
    }

    pub fn api_secret(&self, provider: ProviderId) -> Option<String> {
        self.get(provider, CredentialField::ApiSecret)
    }

    pub fn set_api_key(&self, provider: ProviderId, key: &str) {
        self.set(provider, CredentialField::ApiKey, key);
    }

    pub fn set_api_secret(&self, provider: ProviderId, secret: &str) {
        self.set(provider, CredentialField::ApiSecret, secret);
    }

    /// True when every required field of `provider` is non-empty.
    pub fn has_credential(&self, provider: ProviderId) -> bool {
        provider
            .required_fields()
            .iter()
            .all(|field| self.get(provider, *field).is_some())
    }

    /// True when at least one provider is usable.
    pub fn has_any_credential(&self) -> bool {
        ProviderId::FALLBACK_ORDER
            .iter()
            .any(|p| self.has_credential(*p))
    }

    /// True when at least one secret has actually been stored.
    pub fn has_stored_secret(&self) -> bool {
        ProviderId::FALLBACK_ORDER.iter().any(|p| {
            p.fields()
                .iter()
                .any(|field| self.get(*p, *field).is_some())
        })
    }

    /// Removes every stored secret. The provider selection is kept.
    pub fn clear_all_api_keys(&self) {
        for provider in ProviderId::FALLBACK_ORDER {
            for field in provider.fields() {
                self.set(provider, *field, "");
            }
        }
    }

    /// The stored provider preference, if it names a known provider.
    pub fn explicit_selection(&self) -> Option<ProviderId> {
        self.inner
            .store
            .get(SELECTED_PROVIDER_KEY)
            .and_then(|tag| tag.parse().ok())
    }

    /// The stored preference, or the first usable provider in fallback order.
    pub fn selected_provider(&self) -> ProviderId {
        self.explicit_selection().unwrap_or_else(|| {
            ProviderId::FALLBACK_ORDER
                .into_iter()
                .find(|p| self.has_credential(*p))
                .unwrap_or(ProviderId::Xunfei)
        })
    }

    pub fn set_selected_provider(&self, provider: ProviderId) {
        self.inner.store.set(SELECTED_PROVIDER_KEY, provider.tag());
    }

    pub fn clear_selected_provider(&self) {
        self.inner.store.remove(SELECTED_PROVIDER_KEY);
    }

    pub fn has_shown_key_prompt(&self) -> bool {
        self.inner.store.get(KEY_PROMPT_SHOWN_KEY).as_deref() == Some("true")
    }

    pub fn set_has_shown_key_prompt(&self, shown: bool) {
        self.inner
            .store
            .set(KEY_PROMPT_SHOWN_KEY, if shown { "true" } else { "false" });
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("selected", &self.explicit_selection())
            .finish_non_exhaustive()
    }
}
