//! Read-mostly system data and the "loaded" gate.
//!
//! The metadata catalog and templates form one immutable
//! [`SystemSnapshot`]. [`SystemState`] publishes it through a
//! `tokio::sync::watch` channel, so readers observe either the old or the
//! new snapshot in full. Until the first snapshot is installed, account
//! entry points answer `Loading`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::ports::BlobStore;
use crate::domain::templates::{EmailTemplate, EmailTemplates, SmsTemplate, SmsTemplates};
use crate::domain::{Error, Language, Metadata, ResponseCode};

/// Blob holding the metadata catalog.
pub const METADATA_BLOB: &str = "metadata.json";
/// Blob holding the email templates.
pub const EMAIL_TEMPLATES_BLOB: &str = "email-templates.json";
/// Blob holding the SMS templates.
pub const SMS_TEMPLATES_BLOB: &str = "sms-templates.json";

/// Everything loaded at startup, swapped as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub metadata: Metadata,
    pub email_templates: EmailTemplates,
    pub sms_templates: SmsTemplates,
    pub loaded_at: DateTime<Utc>,
}

impl SystemSnapshot {
    /// Snapshot built only from compiled-in data.
    pub fn builtin(now: DateTime<Utc>) -> Self {
        Self {
            metadata: Metadata::builtin(),
            email_templates: EmailTemplates::builtin(),
            sms_templates: SmsTemplates::default(),
            loaded_at: now,
        }
    }
}

/// Shared handle to the current snapshot.
#[derive(Debug, Clone)]
pub struct SystemState {
    tx: Arc<watch::Sender<Option<Arc<SystemSnapshot>>>>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    /// Unloaded state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// State already holding `snapshot`.
    pub fn loaded(snapshot: SystemSnapshot) -> Self {
        let state = Self::new();
        state.install(snapshot);
        state
    }

    /// Replace the current snapshot atomically.
    pub fn install(&self, snapshot: SystemSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    /// Current snapshot, if loaded.
    pub fn current(&self) -> Option<Arc<SystemSnapshot>> {
        self.tx.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Current snapshot or a `Loading` error.
    pub fn require_loaded(&self) -> Result<Arc<SystemSnapshot>, Error> {
        self.current().ok_or_else(Error::loading)
    }

    /// Resolve once a snapshot has been installed.
    pub async fn wait_loaded(&self) -> Arc<SystemSnapshot> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(snapshot) = rx.borrow_and_update().clone() {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `self`, so this only happens on teardown.
                return Arc::new(SystemSnapshot::builtin(Utc::now()));
            }
        }
    }

    /// Catalog text for `code`. Falls back to the built-in catalog while
    /// loading.
    pub fn text_for(&self, code: ResponseCode, language: Language) -> String {
        match self.current() {
            Some(snapshot) => snapshot.metadata.text_for(code, language),
            None => Metadata::builtin().text_for(code, language),
        }
    }

    /// Load from `loader` and install the result.
    pub async fn reload(&self, loader: &SystemLoader) -> Result<(), Error> {
        let snapshot = loader.load().await?;
        info!(
            response_codes = snapshot.metadata.response_codes.len(),
            languages = snapshot.metadata.languages.len(),
            user_statuses = snapshot.metadata.user_status.len(),
            email_templates = snapshot.email_templates.len(),
            sms_templates = snapshot.sms_templates.len(),
            "system data loaded"
        );
        self.install(snapshot);
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            Self::Many(items) => items.into_iter().next(),
            Self::One(item) => Some(item),
        }
    }
}

/// Reads system data blobs.
pub struct SystemLoader {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl SystemLoader {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { blobs, clock }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, Error> {
        let bytes = self
            .blobs
            .read(path)
            .await
            .map_err(|err| Error::provider(format!("failed to read {path}: {err}")))?;
        let Some(bytes) = bytes else {
            warn!(path, "system blob missing; using built-in data");
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| Error::internal(format!("failed to parse {path}: {err}")))
    }

    /// Build a snapshot, substituting built-in data for missing blobs.
    pub async fn load(&self) -> Result<SystemSnapshot, Error> {
        let metadata = self
            .read_json::<OneOrMany<Metadata>>(METADATA_BLOB)
            .await?
            .and_then(OneOrMany::into_first)
            .unwrap_or_else(Metadata::builtin);
        let email_templates = self
            .read_json::<Vec<EmailTemplate>>(EMAIL_TEMPLATES_BLOB)
            .await?
            .map_or_else(EmailTemplates::builtin, EmailTemplates::from_list);
        let sms_templates = self
            .read_json::<Vec<SmsTemplate>>(SMS_TEMPLATES_BLOB)
            .await?
            .map(SmsTemplates::from_list)
            .unwrap_or_default();
        Ok(SystemSnapshot {
            metadata,
            email_templates,
            sms_templates,
            loaded_at: self.clock.utc(),
        })
    }
}
