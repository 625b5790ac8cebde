//! Durable append-only activity logs.
//!
//! Each entry is one JSON document per line in an hourly blob at
//! `{kind}/yyyy/MM/dd/HH/HH00.log`. Callers detach appends, so a failed
//! write never changes the outcome of the operation being logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;

use crate::domain::ports::BlobStore;
use crate::domain::{Error, Identifier, ResponseCode};

/// Log families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Errors,
    Signins,
}

impl LogKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Errors => "errors",
            Self::Signins => "signins",
        }
    }

    /// Hourly blob path for entries written at `at`.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use sitehub::domain::LogKind;
    ///
    /// let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 41, 0).unwrap();
    /// assert_eq!(LogKind::Signins.blob_path(at), "signins/2026/03/01/09/0900.log");
    /// ```
    pub fn blob_path(self, at: DateTime<Utc>) -> String {
        format!("{}/{}", self.as_str(), at.format("%Y/%m/%d/%H/%H00.log"))
    }
}

/// One sign-in attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninLogEntry {
    pub id: Identifier,
    pub created: DateTime<Utc>,
    pub email: String,
    pub user_agent: String,
    pub code: ResponseCode,
}

/// One unexpected failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub id: Identifier,
    pub created: DateTime<Utc>,
    pub method: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identifier>,
}

/// Writer for both log families.
#[derive(Clone)]
pub struct ActivityLog {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl ActivityLog {
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { blobs, clock }
    }

    async fn append<T: Serialize>(
        &self,
        kind: LogKind,
        at: DateTime<Utc>,
        entry: &T,
    ) -> Result<(), Error> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|err| Error::internal(format!("failed to encode log entry: {err}")))?;
        line.push(b'\n');
        let path = kind.blob_path(at);
        self.blobs
            .append(&path, &line)
            .await
            .map_err(|err| Error::provider(format!("failed to append to {path}: {err}")))
    }

    /// Record a sign-in attempt and its outcome.
    pub async fn record_signin(
        &self,
        email: &str,
        user_agent: &str,
        code: ResponseCode,
    ) -> Result<(), Error> {
        let created = self.clock.utc();
        let entry = SigninLogEntry {
            id: Identifier::generate(),
            created,
            email: email.to_owned(),
            user_agent: user_agent.to_owned(),
            code,
        };
        self.append(LogKind::Signins, created, &entry).await
    }

    /// Record an unexpected failure in `method`.
    pub async fn record_error(
        &self,
        method: &str,
        message: &str,
        user_id: Option<Identifier>,
    ) -> Result<(), Error> {
        let created = self.clock.utc();
        let entry = ErrorLogEntry {
            id: Identifier::generate(),
            created,
            method: method.to_owned(),
            message: message.to_owned(),
            user_id,
        };
        self.append(LogKind::Errors, created, &entry).await
    }
}
