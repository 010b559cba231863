//! Synthetic telemetry for running the pipeline without a broker.

use logpulse_types::{
    ClassificationType, EventKind, IngestEvent, LogLevel, NewAnomalyParam, NewClassification,
    NewLogEntry,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::registry::ConsumerRegistry;
use crate::worker::{sleep_or_shutdown, Shutdown, Workers};

const COMPONENTS: &[&str] = &[
    "dfs.DataNode$PacketResponder",
    "dfs.FSNamesystem",
    "dfs.DataNode$DataXceiver",
    "dfs.DataBlockScanner",
    "namenode.NameNode",
    "dfs.DataNode",
];

const ANOMALY_PARAMS: &[&str] = &[
    "Corrupted block",
    "Missing replicas",
    "Block verification failed",
    "DataNode not responding for block",
    "Unexpected checksum for block",
    "Block under-replicated",
];

const UNIDENTIFIED_PARAMS: &[&str] = &[
    "Unknown block status",
    "Inconsistent block metadata",
    "Borderline replication factor",
    "Unusual access pattern",
    "Block state transition delayed",
];

/// One generation round.
#[derive(Debug, Clone)]
pub struct Tick {
    /// Total items classified this round.
    pub total: u32,
    /// Logs first, then the classification, then its parameters.
    pub events: Vec<IngestEvent>,
}

/// Produces randomized HDFS-style telemetry.
pub struct Generator {
    rng: StdRng,
}

impl Generator {
    /// A seeded generator repeats the same classification sequence.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn tick(&mut self) -> Tick {
        let mut events = Vec::new();

        for _ in 0..self.rng.gen_range(1..=3) {
            events.push(IngestEvent::Log(self.log_entry()));
        }

        let total: u32 = self.rng.gen_range(50..=200);
        let anomaly_share: f64 = self.rng.gen_range(0.01..0.1);
        let unidentified_share: f64 = self.rng.gen_range(0.01..0.05);
        let anomaly_count = (f64::from(total) * anomaly_share) as u32;
        let unidentified_count = (f64::from(total) * unidentified_share) as u32;
        let classification = NewClassification {
            normal_count: total - anomaly_count - unidentified_count,
            anomaly_count,
            unidentified_count,
        };
        events.push(IngestEvent::Classification(classification));

        for (count, tag, templates) in [
            (anomaly_count, ClassificationType::Anomaly, ANOMALY_PARAMS),
            (unidentified_count, ClassificationType::Unidentified, UNIDENTIFIED_PARAMS),
        ] {
            for _ in 0..count.min(3) {
                let label = templates.choose(&mut self.rng).copied().unwrap_or("Block");
                let block = self.block_id();
                events.push(IngestEvent::AnomalyParam(NewAnomalyParam {
                    param_value: format!("{label}: {block}"),
                    classification_type: tag,
                }));
            }
        }

        Tick { total, events }
    }

    fn level(&mut self) -> LogLevel {
        match self.rng.gen_range(0..100) {
            0..=69 => LogLevel::Info,
            70..=84 => LogLevel::Warning,
            85..=94 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }

    /// `blk_` plus 10 to 19 digits, negative about 30% of the time.
    fn block_id(&mut self) -> String {
        let digits: u64 = self.rng.gen_range(1_000_000_000..=9_999_999_999_999_999_999);
        if self.rng.gen_bool(0.3) {
            format!("blk_-{digits}")
        } else {
            format!("blk_{digits}")
        }
    }

    fn endpoint(&mut self) -> String {
        let port = if self.rng.gen_bool(0.5) { 50010 } else { 50020 };
        format!(
            "10.{}.{}.{}:{port}",
            self.rng.gen_range(0..=255u8),
            self.rng.gen_range(0..=255u8),
            self.rng.gen_range(0..=255u8),
        )
    }

    fn message(&mut self, level: LogLevel) -> String {
        let block = self.block_id();
        match level {
            LogLevel::Info => match self.rng.gen_range(0..4) {
                0 => format!(
                    "PacketResponder {} for block {block} terminating",
                    self.rng.gen_range(1..=100)
                ),
                1 => {
                    let node = self.endpoint();
                    let size = 64 * 1024 * 1024 * self.rng.gen_range(1..=16u64);
                    format!(
                        "BLOCK* NameSystem.addStoredBlock: blockMap updated: {node} is added to {block} size {size}"
                    )
                }
                2 => {
                    let src = self.endpoint();
                    let dest = self.endpoint();
                    format!("Receiving block {block} src: {src} dest: {dest}")
                }
                _ => format!("Verification succeeded for {block}"),
            },
            LogLevel::Warning => format!(
                "Slow BlockReceiver write data to disk cost {}ms",
                self.rng.gen_range(1_000..=10_000)
            ),
            LogLevel::Error => format!("Exception in receiveBlock for {block}"),
            LogLevel::Critical => "All datanodes are bad. Shutting down".to_string(),
        }
    }

    fn log_entry(&mut self) -> NewLogEntry {
        let level = self.level();
        let message = self.message(level);
        let now = chrono::Utc::now();
        let thread_id: u32 = self.rng.gen_range(1..=999);
        let component = COMPONENTS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("dfs.DataNode");

        NewLogEntry {
            message: format!(
                "{} [{thread_id}] {} [{component}]: {message}",
                now.format("%y%m%d %H%M%S"),
                level.as_str(),
            ),
            log_level: level.as_str().to_string(),
        }
    }
}

/// Ingestion source that emits one [`Tick`] per interval.
pub struct SyntheticSource {
    interval: Duration,
    seed: Option<u64>,
    registry: ConsumerRegistry,
    workers: Workers,
}

impl SyntheticSource {
    pub fn new(interval: Duration, seed: Option<u64>) -> Self {
        Self {
            interval,
            seed,
            registry: ConsumerRegistry::new(),
            workers: Workers::new(),
        }
    }

    pub fn registry(&self) -> &ConsumerRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn start(&mut self) {
        if self.workers.is_running() {
            return;
        }

        let generator = Generator::new(self.seed);
        let registry = self.registry.clone();
        let shutdown = self.workers.shutdown_signal();
        self.workers
            .spawn(generate(generator, registry, self.interval, shutdown));

        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "started synthetic ingestion"
        );
    }

    pub async fn stop(&mut self) {
        if !self.workers.is_running() {
            return;
        }
        self.workers.stop().await;
        tracing::info!("stopped synthetic ingestion");
    }
}

async fn generate(
    mut generator: Generator,
    registry: ConsumerRegistry,
    interval: Duration,
    mut shutdown: Shutdown,
) {
    loop {
        let tick = generator.tick();
        tracing::debug!(
            total = tick.total,
            events = tick.events.len(),
            "generated synthetic batch"
        );
        for event in tick.events {
            if *shutdown.borrow() {
                return;
            }
            registry.dispatch(event).await;
        }

        if sleep_or_shutdown(&mut shutdown, interval).await {
            return;
        }
    }
}
