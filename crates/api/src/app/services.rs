use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::info;

use stockledger_core::{Aggregate, AggregateId, DomainError, TenantId};
use stockledger_events::{EventEnvelope, InMemoryEventBus};
use stockledger_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{
        EventFilter, EventQuery, EventQueryResult, EventStore, EventStoreError, InMemoryEventStore, Pagination,
        StoredEvent,
    },
    projections::ReadModels,
    workers::{ProjectionWorker, WorkerHandle},
    workflows::Workflows,
};

/// Event store backends usable by the API: appendable and queryable.
pub trait EventLog: EventStore + EventQuery {}

impl<T: EventStore + EventQuery + ?Sized> EventLog for T {}

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Arc<dyn EventLog>, Bus>;

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

impl RealtimeMessage {
    fn from_envelope(envelope: &EventEnvelope<JsonValue>) -> Self {
        Self {
            tenant_id: envelope.tenant_id(),
            topic: envelope.aggregate_type().to_string(),
            payload: serde_json::json!({
                "event_id": envelope.event_id(),
                "aggregate_id": envelope.aggregate_id(),
                "sequence_number": envelope.sequence_number(),
            }),
        }
    }
}

/// Everything handlers need: the write path, the read models and the
/// realtime channel.
///
/// Committed events are applied to the read models on the request path so a
/// client reads its own writes. The projection worker sees the same events
/// from the bus; cursors make the second delivery a no-op, and it is the
/// worker that feeds `/stream`.
pub struct AppServices {
    dispatcher: Dispatcher,
    read_models: Arc<ReadModels>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    _worker: WorkerHandle,
}

impl AppServices {
    pub fn new(store: Arc<dyn EventLog>) -> std::io::Result<Self> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let read_models = Arc::new(ReadModels::new());

        // Lossy broadcast; tenant-filtered per subscriber.
        let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

        let worker = {
            let read_models = read_models.clone();
            let realtime_tx = realtime_tx.clone();
            ProjectionWorker::spawn("api-projections", bus.clone(), None, move |env: EventEnvelope<JsonValue>| {
                read_models.apply(&env)?;
                let _ = realtime_tx.send(RealtimeMessage::from_envelope(&env));
                Ok::<(), stockledger_infra::projections::ProjectionError>(())
            })?
        };

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            realtime_tx,
            _worker: worker,
        })
    }

    pub fn in_memory() -> std::io::Result<Self> {
        Self::new(Arc::new(InMemoryEventStore::new()))
    }

    /// Replays the whole log into the read models (startup).
    pub fn rebuild_read_models(&self) -> Result<usize, EventStoreError> {
        let applied = self.read_models.rebuild(self.dispatcher.store())?;
        info!(applied, "read models rebuilt from the event log");
        Ok(applied)
    }

    pub fn read_models(&self) -> &ReadModels {
        &self.read_models
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    /// Workflows whose commits, compensations included, reach the read models at once.
    pub fn workflows(&self) -> Workflows<'_, Arc<dyn EventLog>, Bus> {
        Workflows::new(&self.dispatcher).with_sink(self.read_models.as_ref())
    }

    /// Applies freshly committed events to the read models.
    fn commit(&self, events: Vec<StoredEvent>) -> Vec<StoredEvent> {
        for e in &events {
            self.read_models.apply_logged(&e.to_envelope());
        }
        events
    }

    /// Dispatches one command and makes its events visible to reads.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockledger_events::Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        Ok(self.commit(committed))
    }

    pub async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        self.dispatcher.store().query_events(tenant_id, filter, pagination).await
    }
}

/// SSE stream of one tenant's projection updates (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
