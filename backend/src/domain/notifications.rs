//! Notification dispatch: rendered emails and domain events on the outbound
//! queues.
//!
//! Dispatch only produces queue messages; delivery is somebody else's job.
//! Callers run these methods as detached side effects.

use std::collections::BTreeMap;
use std::sync::Arc;

use mockable::Clock;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use url::form_urlencoded;

use crate::domain::ports::{CredentialService, NotificationQueue, QueueName, VerificationTicket};
use crate::domain::templates::EmailTemplateId;
use crate::domain::{Error, Identifier, SystemState, UserAccount};

/// Events published to the event queue as `{event, payload}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all_fields = "camelCase")]
pub enum AccountEvent {
    #[serde(rename = "user-created")]
    Created {
        user_id: Identifier,
        email: String,
        name: String,
    },
    #[serde(rename = "user-password-updated")]
    PasswordUpdated { user_id: Identifier },
    #[serde(rename = "user-email-verified")]
    EmailVerified { user_id: Identifier },
    #[serde(rename = "user-email-changed")]
    EmailChanged {
        user_id: Identifier,
        email: String,
        email_old: String,
    },
    #[serde(rename = "user-cancelled")]
    Cancelled { user_id: Identifier },
}

impl AccountEvent {
    /// Event name as published.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "user-created",
            Self::PasswordUpdated { .. } => "user-password-updated",
            Self::EmailVerified { .. } => "user-email-verified",
            Self::EmailChanged { .. } => "user-email-changed",
            Self::Cancelled { .. } => "user-cancelled",
        }
    }
}

/// Produces outbound email and event messages.
pub struct NotificationDispatch {
    queue: Arc<dyn NotificationQueue>,
    credentials: Arc<dyn CredentialService>,
    system: SystemState,
    clock: Arc<dyn Clock>,
    site_url: String,
}

impl NotificationDispatch {
    /// `site_url` is the base for links and should end with `/`.
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        credentials: Arc<dyn CredentialService>,
        system: SystemState,
        clock: Arc<dyn Clock>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            credentials,
            system,
            clock,
            site_url: site_url.into(),
        }
    }

    /// Link the verification email points at.
    pub fn verification_url(&self, token: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
        format!("{}verify?code={encoded}", self.site_url)
    }

    fn base_parameters(&self, display_name: &str) -> BTreeMap<String, String> {
        let url = &self.site_url;
        BTreeMap::from([
            ("DisplayName".to_owned(), display_name.to_owned()),
            ("HomeUrl".to_owned(), url.clone()),
            ("LoginUrl".to_owned(), format!("{url}login")),
            ("SignupUrl".to_owned(), format!("{url}signup")),
            ("LogoUrl".to_owned(), format!("{url}statics/logo.png")),
            ("PhishingUrl".to_owned(), format!("{url}phishing")),
        ])
    }

    async fn send_template(
        &self,
        user_id: Identifier,
        to: &str,
        template_id: EmailTemplateId,
        parameters: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let snapshot = self.system.require_loaded()?;
        let template = snapshot
            .email_templates
            .get(template_id)
            .ok_or_else(|| Error::provider(format!("no template found for {template_id:?}")))?;
        let rendered = template.render(&parameters)?;
        let message = json!({
            "userId": user_id,
            "created": self.clock.utc(),
            "to": to,
            "subj": rendered.subject,
            "body": rendered.body,
            "html": rendered.html,
        });
        self.queue
            .enqueue(QueueName::OutboundEmail, message)
            .await
            .map_err(|err| Error::provider(err.to_string()))?;
        debug!(user_id = %user_id, template = ?template_id, "email queued");
        Ok(())
    }

    /// Queue the verification email for the account's pending code.
    /// Accounts with nothing pending are left alone.
    pub async fn send_email_verification(&self, account: &UserAccount) -> Result<(), Error> {
        let Some(pending) = &account.email_verification else {
            return Ok(());
        };
        let token = self
            .credentials
            .issue_verification(&VerificationTicket {
                user_id: account.id,
                code: pending.code.clone(),
            })
            .map_err(|err| Error::provider(err.to_string()))?;
        let mut parameters = self.base_parameters(account.display_name_or_email());
        parameters.insert("EmailVerificationUrl".to_owned(), self.verification_url(&token));
        self.send_template(
            account.id,
            &account.email,
            EmailTemplateId::EmailVerification,
            parameters,
        )
        .await
    }

    /// Tell the previous address that the account moved to a new one.
    pub async fn send_email_change_notice(
        &self,
        account: &UserAccount,
        old_email: &str,
    ) -> Result<(), Error> {
        let mut parameters = self.base_parameters(account.display_name_or_email());
        parameters.insert("NewEmail".to_owned(), account.email.clone());
        self.send_template(account.id, old_email, EmailTemplateId::EmailChanged, parameters)
            .await
    }

    /// Publish a domain event.
    pub async fn publish(&self, event: &AccountEvent) -> Result<(), Error> {
        let message = serde_json::to_value(event)
            .map_err(|err| Error::internal(format!("failed to encode event: {err}")))?;
        self.queue
            .enqueue(QueueName::Event, message)
            .await
            .map_err(|err| Error::provider(err.to_string()))?;
        debug!(event = event.name(), "event published");
        Ok(())
    }
}
