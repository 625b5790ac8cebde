//! Adapter selection and hub assembly.
//!
//! A configured database URL selects the PostgreSQL table store (behind the
//! retrying decorator) and queue; otherwise both live in memory. A blob
//! root selects the directory blob store; otherwise blobs live in memory.

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use mockable::{Clock, DefaultClock};
use tracing::{info, warn};

use sitehub::domain::account_directory::AccountDirectoryPorts;
use sitehub::domain::notifications::NotificationDispatch;
use sitehub::domain::ports::{BlobStore, CredentialService, HubService, NotificationQueue, TableStore};
use sitehub::domain::side_effects::{SharedSideEffects, TokioSideEffects};
use sitehub::domain::{
    AccountDirectory, ActionProcessor, ActivityLog, Authenticator, HashCost, PasswordHasher,
    SiteHub, SystemLoader, SystemState,
};
use sitehub::outbound::blob::{DirBlobStore, MemoryBlobStore};
use sitehub::outbound::persistence::{
    DbPool, DieselNotificationQueue, DieselTableStore, MemoryTableStore, RetryingTableStore,
    run_migrations,
};
use sitehub::outbound::queue::MemoryNotificationQueue;
use sitehub::outbound::token::JwtCredentialService;
use sitehub::settings::HubSettings;

/// Everything the server and the startup load need.
pub struct HubComponents {
    pub hub: Arc<dyn HubService>,
    pub system: SystemState,
    pub loader: SystemLoader,
}

async fn build_storage(
    settings: &HubSettings,
) -> Result<(Arc<dyn TableStore>, Arc<dyn NotificationQueue>)> {
    let Some(database_url) = settings.database_url.as_deref() else {
        warn!("no database configured; accounts live in memory");
        return Ok((
            Arc::new(MemoryTableStore::new()),
            Arc::new(MemoryNotificationQueue::new()),
        ));
    };

    run_migrations(database_url)
        .await
        .wrap_err("failed to apply database migrations")?;
    let policy = settings.retry_policy();
    let pool = DbPool::new(settings.pool_config(database_url))
        .await
        .wrap_err("failed to build database pool")?;
    info!("using PostgreSQL storage");
    Ok((
        Arc::new(RetryingTableStore::new(
            Arc::new(DieselTableStore::new(pool.clone())),
            policy,
        )),
        Arc::new(DieselNotificationQueue::new(pool)),
    ))
}

fn build_blobs(settings: &HubSettings) -> Result<Arc<dyn BlobStore>> {
    match settings.blob_root.as_deref() {
        Some(root) => {
            let store = DirBlobStore::open(root)
                .wrap_err_with(|| format!("failed to open blob root {root}"))?;
            info!(root, "using directory blob storage");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no blob root configured; activity logs live in memory");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
    }
}

/// Wire the hub from `settings`.
pub async fn build_hub(settings: &HubSettings) -> Result<HubComponents> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let (store, queue) = build_storage(settings).await?;
    let blobs = build_blobs(settings)?;
    let credentials: Arc<dyn CredentialService> = Arc::new(JwtCredentialService::new(
        &settings.token_secret(),
        settings.token_ttl()?,
        Arc::clone(&clock),
    ));
    let side_effects: SharedSideEffects = Arc::new(TokioSideEffects);
    let system = SystemState::new();

    let notifications = Arc::new(NotificationDispatch::new(
        queue,
        Arc::clone(&credentials),
        system.clone(),
        Arc::clone(&clock),
        settings.site_url()?,
    ));
    let directory = Arc::new(AccountDirectory::new(
        AccountDirectoryPorts {
            store,
            clock: Arc::clone(&clock),
            notifications,
            side_effects: Arc::clone(&side_effects),
        },
        PasswordHasher::new(HashCost::default()),
    ));
    let activity = ActivityLog::new(Arc::clone(&blobs), Arc::clone(&clock));
    let processor = Arc::new(ActionProcessor::new(
        Arc::clone(&directory),
        system.clone(),
        activity.clone(),
        Arc::clone(&side_effects),
    ));
    let authenticator = Authenticator::new(directory, activity, side_effects);

    Ok(HubComponents {
        hub: Arc::new(SiteHub::new(processor, authenticator, credentials)),
        system,
        loader: SystemLoader::new(blobs, clock),
    })
}
