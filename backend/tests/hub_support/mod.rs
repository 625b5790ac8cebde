//! Shared world for end-to-end hub tests over the in-memory adapters.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use mockable::Clock;
use serde_json::Value;
use zeroize::Zeroizing;

use sitehub::domain::account_directory::AccountDirectoryPorts;
use sitehub::domain::notifications::NotificationDispatch;
use sitehub::domain::ports::{BlobStore, CredentialService, HubReply, HubService, QueueName};
use sitehub::domain::{
    AccountDirectory, ActionProcessor, ActivityLog, Authenticator, Credentials, HashCost,
    LogKind, PasswordHasher, SignupRequest, SiteHub, SystemSnapshot, SystemState,
};
use sitehub::outbound::blob::MemoryBlobStore;
use sitehub::outbound::persistence::MemoryTableStore;
use sitehub::outbound::queue::MemoryNotificationQueue;
use sitehub::outbound::token::JwtCredentialService;
use sitehub::test_support::{DeferredSideEffects, FaultyTableStore, MutableClock};

pub const PASSWORD: &str = "Abcdefg1!";

pub struct World {
    pub hub: SiteHub,
    pub system: SystemState,
    pub directory: Arc<AccountDirectory>,
    pub store: Arc<FaultyTableStore>,
    pub queue: Arc<MemoryNotificationQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    pub effects: Arc<DeferredSideEffects>,
    pub clock: Arc<MutableClock>,
}

impl World {
    pub fn new() -> Self {
        let now = Utc::now();
        let clock = Arc::new(MutableClock::new(now));
        let store = Arc::new(FaultyTableStore::new(Arc::new(MemoryTableStore::new())));
        let queue = Arc::new(MemoryNotificationQueue::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let effects = Arc::new(DeferredSideEffects::new());
        let system = SystemState::loaded(SystemSnapshot::builtin(now));
        let credentials: Arc<dyn CredentialService> = Arc::new(JwtCredentialService::new(
            &Zeroizing::new("integration-secret".to_owned()),
            TimeDelta::hours(24),
            clock.clone(),
        ));

        let notifications = Arc::new(NotificationDispatch::new(
            queue.clone(),
            Arc::clone(&credentials),
            system.clone(),
            clock.clone(),
            "https://hub.test/",
        ));
        let directory = Arc::new(AccountDirectory::new(
            AccountDirectoryPorts {
                store: store.clone(),
                clock: clock.clone(),
                notifications,
                side_effects: effects.clone(),
            },
            PasswordHasher::new(HashCost::fast()),
        ));
        let activity = ActivityLog::new(blobs.clone(), clock.clone());
        let processor = Arc::new(ActionProcessor::new(
            Arc::clone(&directory),
            system.clone(),
            activity.clone(),
            effects.clone(),
        ));
        let authenticator = Authenticator::new(Arc::clone(&directory), activity, effects.clone());

        Self {
            hub: SiteHub::new(processor, authenticator, credentials),
            system,
            directory,
            store,
            queue,
            blobs,
            effects,
            clock,
        }
    }

    /// Run every detached side effect queued so far.
    pub async fn settle(&self) {
        self.effects.run_all().await;
    }

    pub async fn signup(&self, email: &str) -> HubReply {
        let reply = self
            .hub
            .signup(SignupRequest {
                email: email.to_owned(),
                password: Zeroizing::new(PASSWORD.to_owned()),
                display_name: "Jane".to_owned(),
                agree: true,
                ..SignupRequest::default()
            })
            .await;
        self.settle().await;
        reply
    }

    pub async fn signin(&self, email: &str, password: &str) -> HubReply {
        let reply = self
            .hub
            .signin(
                Credentials {
                    username: email.to_owned(),
                    password: Zeroizing::new(password.to_owned()),
                    language: None,
                },
                "integration/1.0".to_owned(),
            )
            .await;
        self.settle().await;
        reply
    }

    /// Token from the newest verification email sent to `email`.
    pub fn verification_token(&self, email: &str) -> Option<String> {
        self.queue
            .messages(QueueName::OutboundEmail)
            .iter()
            .rev()
            .filter(|message| message["to"] == email)
            .filter_map(|message| message["body"].as_str())
            .find_map(|body| {
                let (_, rest) = body.split_once("verify?code=")?;
                let token: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                    .collect();
                Some(token)
            })
    }

    /// Names of published events, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.queue
            .messages(QueueName::Event)
            .iter()
            .filter_map(|message| message["event"].as_str().map(str::to_owned))
            .collect()
    }

    /// Sign-in audit lines written this hour.
    pub async fn signin_audit(&self) -> Vec<Value> {
        let path = LogKind::Signins.blob_path(self.clock.utc());
        let bytes = self
            .blobs
            .read(&path)
            .await
            .expect("blob read")
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }
}
