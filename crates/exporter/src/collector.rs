use std::time::Duration;

use fah_core::model::{ClientOptions, Slot, Snapshot, Task};
use fah_core::protocol::{Connection, ProtocolError, OPTIONS, QUEUE_INFO, SLOT_INFO};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::donor::{DonorSource, EnrichmentGate, StatsApi};
use crate::registry::{GaugeRegistry, PublishStats};

/// Why a poll produced no snapshot. Any of these marks the exporter down.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("cannot connect to FAH client at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read {command}: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: ProtocolError,
    },
    #[error("FAH client did not answer within {0:?}")]
    Timeout(Duration),
}

/// State carried between polls. Only touched under the collector's lock.
struct CycleState<D> {
    previous: Snapshot,
    enrichment: Option<EnrichmentGate<D>>,
}

/// Polls the client on demand and keeps the gauges in line with the latest
/// snapshot. One cycle runs at a time.
pub struct Collector<D = StatsApi> {
    address: String,
    timeout: Duration,
    registry: GaugeRegistry,
    state: Mutex<CycleState<D>>,
}

impl<D: DonorSource> Collector<D> {
    /// `timeout` bounds connecting plus reading all three commands.
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
        enrichment: Option<EnrichmentGate<D>>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            address: address.into(),
            timeout,
            registry: GaugeRegistry::new(enrichment.is_some())?,
            state: Mutex::new(CycleState {
                previous: Snapshot::default(),
                enrichment,
            }),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    /// Runs one cycle and returns the resulting exposition.
    ///
    /// A failed poll is not an error here: it is reported through `fah_up`.
    pub async fn scrape(&self) -> anyhow::Result<String> {
        let mut state = self.state.lock().await;
        // Already logged and reflected in `fah_up`.
        if let Err(e) = self.cycle(&mut state).await {
            debug!(error = %e, "serving last published values");
        }
        self.registry.encode()
    }

    /// Runs one cycle without encoding.
    pub async fn collect(&self) -> Result<PublishStats, CollectError> {
        let mut state = self.state.lock().await;
        self.cycle(&mut state).await
    }

    async fn cycle(&self, state: &mut CycleState<D>) -> Result<PublishStats, CollectError> {
        let polled = match tokio::time::timeout(self.timeout, self.read_client()).await {
            Ok(result) => result,
            Err(_) => Err(CollectError::Timeout(self.timeout)),
        };
        let mut snapshot = match polled {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to collect metrics");
                self.registry.mark_down();
                return Err(e);
            }
        };

        if let Some(gate) = state.enrichment.as_mut() {
            let outcome = gate.fetch(&snapshot.options.user).await;
            debug!(user = %snapshot.options.user, cached = outcome.cached, "donor data attached");
            snapshot.donor = Some(outcome.donor);
        }

        for task in snapshot.orphaned_tasks() {
            debug!(slot = %task.slot, queue = %task.id, "task refers to an unknown slot");
        }

        let stats = self.registry.publish(&state.previous, &snapshot);
        debug!(
            set = stats.set,
            removed = stats.removed,
            skipped = stats.skipped,
            "metrics published"
        );
        state.previous = snapshot;
        Ok(stats)
    }

    /// Reads one snapshot over a fresh connection. The connection is dropped on
    /// every return path.
    async fn read_client(&self) -> Result<Snapshot, CollectError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|source| CollectError::Connect {
                address: self.address.clone(),
                source,
            })?;
        let mut conn = Connection::new(stream);

        let tasks: Vec<Task> = request(&mut conn, QUEUE_INFO).await?;
        let slots: Vec<Slot> = request(&mut conn, SLOT_INFO).await?;
        let options: ClientOptions = request(&mut conn, OPTIONS).await?;

        if let Err(e) = conn.close().await {
            debug!(error = %e, "closing FAH client connection failed");
        }

        Ok(Snapshot {
            tasks,
            slots,
            options,
            donor: None,
        })
    }
}

async fn request<T: serde::de::DeserializeOwned>(
    conn: &mut Connection<TcpStream>,
    command: &'static str,
) -> Result<T, CollectError> {
    conn.request(command)
        .await
        .map_err(|source| CollectError::Command { command, source })
}
