//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports (`TableStore`, `BlobStore`, `NotificationQueue`,
//! `CredentialService`) describe the infrastructure the core needs; the
//! driving port `HubService` is what the realtime adapter calls.

mod macros;
pub(crate) use macros::define_port_error;

mod blob_store;
mod credential_service;
mod hub_service;
mod notification_queue;
mod table_store;

#[cfg(test)]
pub use blob_store::MockBlobStore;
pub use blob_store::{BlobStore, BlobStoreError};
#[cfg(test)]
pub use credential_service::MockCredentialService;
pub use credential_service::{
    CredentialError, CredentialService, TokenClaims, VerificationTicket,
};
#[cfg(test)]
pub use hub_service::MockHubService;
pub use hub_service::{HubReply, HubService};
#[cfg(test)]
pub use notification_queue::MockNotificationQueue;
pub use notification_queue::{NotificationQueue, QueueError, QueueName};
#[cfg(test)]
pub use table_store::MockTableStore;
pub use table_store::{
    ETag, EntityKey, EntityRecord, StoreError, Table, TableOperation, TableStore,
    ensure_single_partition,
};
