use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, instrument};

use stockledger_catalog::VariantKey;
use stockledger_core::{DomainError, TenantId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_storage::{AllocateStock, ReleaseReason, ReleaseStock, StockSource, StorageCommand, StorageId};

use super::{Workflows, dry_run};
use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

impl<S, B> Workflows<'_, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Move units between two storages: release from `from`, allocate into `to`.
    ///
    /// A failed allocation puts the units back into `from`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, from = %from, to = %to))]
    pub fn transfer_stock(
        &self,
        tenant_id: TenantId,
        from: StorageId,
        to: StorageId,
        key: VariantKey,
        quantity: u64,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        if from == to {
            return Err(DomainError::validation("source and target storage are the same").into());
        }
        let allocate = StorageCommand::AllocateStock(AllocateStock {
            tenant_id,
            storage_id: to,
            key,
            quantity,
            source: StockSource::Transfer { from },
            occurred_at: Utc::now(),
        });
        let mut target = self.storage(tenant_id, to)?;
        dry_run(&mut target, &allocate)?;

        let mut out = self.dispatch_storage(
            tenant_id,
            from,
            StorageCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                storage_id: from,
                key,
                quantity,
                reason: ReleaseReason::Transfer { to },
                occurred_at: Utc::now(),
            }),
        )?;

        match self.dispatch_storage(tenant_id, to, allocate) {
            Ok(events) => {
                out.extend(events);
                Ok(out)
            }
            Err(err) => {
                let back = StorageCommand::AllocateStock(AllocateStock {
                    tenant_id,
                    storage_id: from,
                    key,
                    quantity,
                    // Units come back from the target that refused them.
                    source: StockSource::Transfer { from: to },
                    occurred_at: Utc::now(),
                });
                if let Err(back_err) = self.dispatch_storage(tenant_id, from, back) {
                    error!(error = %back_err, "failed to return units to the source storage");
                }
                Err(err)
            }
        }
    }
}
