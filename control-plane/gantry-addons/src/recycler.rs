use std::sync::Arc;

use gantry_storage::AttachmentStorage;
use tracing::{info, warn};

use crate::error::AddonResult;
use crate::provider::RemoteProviderClient;

/// Drops unbound attachments once their provider forgets the instance.
pub struct RecyclingPoller {
    storage: Arc<dyn AttachmentStorage>,
    provider: Arc<RemoteProviderClient>,
}

impl RecyclingPoller {
    pub fn new(storage: Arc<dyn AttachmentStorage>, provider: Arc<RemoteProviderClient>) -> Self {
        Self { storage, provider }
    }

    /// One pass over the pending rows; returns how many were dropped. A
    /// provider hiccup skips the row until the next sweep.
    pub async fn sweep(&self) -> AddonResult<usize> {
        let pending = self.storage.list_unbound_attachments().await?;
        let mut dropped = 0usize;
        for row in pending {
            match self
                .provider
                .get_instance(&row.service_id, &row.service_instance_id)
                .await
            {
                Ok(None) => {
                    self.storage.delete_unbound_attachment(row.id).await?;
                    dropped += 1;
                    info!(
                        instance = %row.service_instance_id,
                        "recycle confirmed, row dropped"
                    );
                }
                Ok(Some(_)) => {}
                Err(error) => {
                    warn!(
                        %error,
                        instance = %row.service_instance_id,
                        "recycle check failed"
                    );
                }
            }
        }
        Ok(dropped)
    }
}
