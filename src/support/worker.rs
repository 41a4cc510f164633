//! Dedicated worker thread that owns the tree
//!
//! Producers queue [`Update`]s through a [`SupportClient`] and never block.
//! The worker applies them one at a time and, once the queue has been quiet
//! for the debounce window, reports every group that lost its support.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::arena::{PackedPairArena, PairStore};
use crate::core::{Error, IVec3, Result, SupportConfig};
use crate::octree::{ChainId, DetachedGroup, SolidityGrid, Tree, TreeStats};

use super::update::Update;

/// Something the worker wants its owner to know
#[derive(Debug, Clone)]
pub enum SupportEvent {
    /// A group of blocks is neither supported nor touching the loaded boundary
    Detached(DetachedGroup),
    /// The worker hit an invariant violation and stopped
    Failed(String),
}

/// Summary of the topmost chain at a position
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub supported: bool,
    pub touching_boundary: bool,
    pub detached: bool,
    pub size: i32,
}

enum Message {
    Update(Update),
    Validate(oneshot::Sender<Result<()>>),
    Sync(oneshot::Sender<()>),
    Stats(oneshot::Sender<TreeStats>),
    ChainAt(IVec3, oneshot::Sender<Option<ChainReport>>),
}

/// Cloneable sender side of the worker
#[derive(Clone)]
pub struct SupportClient {
    commands: mpsc::UnboundedSender<Message>,
    queued: Arc<AtomicUsize>,
    /// Set once the worker stops on a failure
    failure: watch::Receiver<Option<String>>,
}

impl SupportClient {
    /// Queue a structural update
    pub fn submit(&self, update: Update) -> Result<()> {
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.commands.send(Message::Update(update)).map_err(|_| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.stopped()
        })
    }

    pub fn add_block(&self, pos: IVec3) -> Result<()> {
        self.submit(Update::AddBlock(pos))
    }

    pub fn remove_block(&self, pos: IVec3) -> Result<()> {
        self.submit(Update::RemoveBlock(pos))
    }

    pub fn load_chunk(&self, grid: SolidityGrid, position: IVec3) -> Result<()> {
        self.submit(Update::LoadChunk { position, grid })
    }

    pub fn unload_chunk(&self, position: IVec3) -> Result<()> {
        self.submit(Update::UnloadChunk(position))
    }

    /// Updates queued but not yet applied
    pub fn pending_updates(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Whether the worker is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Why the worker no longer answers
    fn stopped(&self) -> Error {
        match self.failure.borrow().clone() {
            Some(message) => Error::WorkerFailed(message),
            None => Error::WorkerStopped,
        }
    }

    fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> Result<oneshot::Receiver<T>> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| self.stopped())?;
        Ok(rx)
    }

    /// Validate the tree after every earlier command has been applied
    pub async fn validate(&self) -> Result<()> {
        self.request(Message::Validate)?
            .await
            .map_err(|_| self.stopped())?
    }

    /// Blocking form of [`validate`](Self::validate). Must not be called from
    /// inside an async runtime.
    pub fn validate_blocking(&self) -> Result<()> {
        self.request(Message::Validate)?
            .blocking_recv()
            .map_err(|_| self.stopped())?
    }

    /// Wait until every earlier command is applied and a detection pass has
    /// run over them
    pub async fn sync(&self) -> Result<()> {
        self.request(Message::Sync)?
            .await
            .map_err(|_| self.stopped())
    }

    pub fn sync_blocking(&self) -> Result<()> {
        self.request(Message::Sync)?
            .blocking_recv()
            .map_err(|_| self.stopped())
    }

    pub async fn stats(&self) -> Result<TreeStats> {
        self.request(Message::Stats)?
            .await
            .map_err(|_| self.stopped())
    }

    pub fn stats_blocking(&self) -> Result<TreeStats> {
        self.request(Message::Stats)?
            .blocking_recv()
            .map_err(|_| self.stopped())
    }

    pub async fn chain_at(&self, pos: IVec3) -> Result<Option<ChainReport>> {
        self.request(|reply| Message::ChainAt(pos, reply))?
            .await
            .map_err(|_| self.stopped())
    }
}

/// Owner's handle: a client plus the event stream and the thread.
/// Dropping it stops the worker and joins its thread.
pub struct SupportHandle {
    client: SupportClient,
    events: mpsc::UnboundedReceiver<SupportEvent>,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl SupportHandle {
    /// Start a worker over a tree backed by the packed pair arenas
    pub fn spawn(config: SupportConfig) -> Result<Self> {
        Self::spawn_with_store::<PackedPairArena<ChainId>>(config)
    }

    /// Start a worker over a tree backed by any pair store
    pub fn spawn_with_store<S>(config: SupportConfig) -> Result<Self>
    where
        S: PairStore<ChainId> + Sync + 'static,
    {
        config.validate()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (failure_tx, failure_rx) = watch::channel(None);
        let queued = Arc::new(AtomicUsize::new(0));

        let worker_queued = queued.clone();
        let thread = std::thread::Builder::new()
            .name("support-worker".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build();
                let runtime = match runtime {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::error!("Failed to create support worker runtime: {}", e);
                        let outbox = Outbox {
                            events: event_tx,
                            failure: failure_tx,
                        };
                        outbox.fail(e.to_string());
                        drain_unapplied(command_rx, &worker_queued);
                        return;
                    }
                };
                let worker = Worker {
                    tree: Tree::<S>::with_store(&config),
                    recorded: Vec::new(),
                    outbox: Outbox {
                        events: event_tx,
                        failure: failure_tx,
                    },
                    queued: worker_queued,
                    debounce: config.debounce(),
                    audit_interval: config.audit_interval,
                    updates_since_audit: 0,
                    last_pass: Instant::now(),
                };
                runtime.block_on(worker.run(command_rx, shutdown_rx));
            })?;

        log::info!("Support worker started");
        Ok(Self {
            client: SupportClient {
                commands: command_tx,
                queued,
                failure: failure_rx,
            },
            events: event_rx,
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn client(&self) -> &SupportClient {
        &self.client
    }

    /// Drain events without blocking
    pub fn poll_events(&mut self) -> Vec<SupportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event, giving up after `timeout`. Must not be
    /// called from inside an async runtime.
    pub fn next_event_blocking(&mut self, timeout: Duration) -> Option<SupportEvent> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(mpsc::error::TryRecvError::Disconnected) => return None,
                Err(mpsc::error::TryRecvError::Empty) => {}
            }
            if std::time::Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Ask the worker to stop after the command in progress and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Support worker thread panicked");
            }
            log::info!("Support worker stopped");
        }
    }
}

impl std::ops::Deref for SupportHandle {
    type Target = SupportClient;

    fn deref(&self) -> &SupportClient {
        &self.client
    }
}

impl Drop for SupportHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Next {
    Message(Option<Message>),
    Idle,
    Shutdown,
}

struct Worker<S> {
    tree: Tree<S>,
    /// Chains touched since the last detection pass
    recorded: Vec<ChainId>,
    outbox: Outbox,
    queued: Arc<AtomicUsize>,
    debounce: Duration,
    audit_interval: Option<u32>,
    updates_since_audit: u32,
    last_pass: Instant,
}

impl<S: PairStore<ChainId> + Sync> Worker<S> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => Next::Shutdown,
                message = commands.recv() => Next::Message(message),
                _ = tokio::time::sleep(self.debounce), if !self.recorded.is_empty() => Next::Idle,
            };

            match next {
                Next::Shutdown | Next::Message(None) => break,
                Next::Idle => {
                    if !self.detect() {
                        break;
                    }
                }
                Next::Message(Some(message)) => {
                    if !self.handle(message) {
                        break;
                    }
                    let due = self.last_pass.elapsed() >= self.debounce;
                    if commands.is_empty() && due && !self.recorded.is_empty() && !self.detect() {
                        break;
                    }
                }
            }
        }
        drain_unapplied(commands, &self.queued);
    }

    /// Handle one message. Returns false once the worker must stop.
    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Update(update) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                let tree = &mut self.tree;
                let Some(changed) = self.outbox.guarded(|| update.apply(tree)) else {
                    return false;
                };
                self.recorded.extend(changed);
                self.audit()
            }
            Message::Validate(reply) => {
                let result = self.tree.validate();
                if let Err(e) = &result {
                    log::warn!("Validation failed: {}", e);
                }
                let _ = reply.send(result);
                true
            }
            Message::Sync(reply) => {
                let alive = self.detect();
                let _ = reply.send(());
                alive
            }
            Message::Stats(reply) => {
                let _ = reply.send(self.tree.stats());
                true
            }
            Message::ChainAt(pos, reply) => {
                let report = self.tree.chain_at(pos).map(|chain| ChainReport {
                    supported: self.tree.is_supported(chain),
                    touching_boundary: self.tree.is_touching_any_side(chain),
                    detached: self.tree.is_detached(chain),
                    size: self.tree.chain_size(chain),
                });
                let _ = reply.send(report);
                true
            }
        }
    }

    /// Run the periodic validation if one is due
    fn audit(&mut self) -> bool {
        let Some(interval) = self.audit_interval else {
            return true;
        };
        self.updates_since_audit += 1;
        if self.updates_since_audit < interval {
            return true;
        }
        self.updates_since_audit = 0;
        match self.tree.validate() {
            Ok(()) => true,
            Err(e) => {
                self.outbox.fail(e.to_string());
                false
            }
        }
    }

    /// Report every recorded chain that ended up detached
    fn detect(&mut self) -> bool {
        let recorded = std::mem::take(&mut self.recorded);
        let tree = &self.tree;
        let Some(groups) = self.outbox.guarded(|| tree.detached_groups(recorded)) else {
            return false;
        };
        for group in groups {
            log::info!("Detached group of {} blocks", group.len());
            let _ = self.outbox.events.send(SupportEvent::Detached(group));
        }
        self.last_pass = Instant::now();
        true
    }
}

/// Close the queue and take whatever updates it still holds off the count
fn drain_unapplied(mut commands: mpsc::UnboundedReceiver<Message>, queued: &AtomicUsize) {
    commands.close();
    while let Ok(message) = commands.try_recv() {
        if let Message::Update(update) = message {
            log::debug!("Dropping unapplied update: {}", update.kind());
            queued.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Where the worker reports to its owner and clients
struct Outbox {
    events: mpsc::UnboundedSender<SupportEvent>,
    failure: watch::Sender<Option<String>>,
}

impl Outbox {
    /// Run `f`, turning a panic into a failure
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fail(message);
                None
            }
        }
    }

    /// Record the failure for clients, then tell the owner
    fn fail(&self, message: String) {
        log::error!("Support worker stopping: {}", message);
        self.failure.send_replace(Some(message.clone()));
        let _ = self.events.send(SupportEvent::Failed(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::CheckedPairArena;
    use crate::core::logging;

    fn config() -> SupportConfig {
        logging::init_for_tests();
        SupportConfig {
            chunk_size: 4,
            debounce_ms: 20,
            audit_interval: Some(1),
            ..SupportConfig::default()
        }
    }

    fn detached(events: Vec<SupportEvent>) -> Vec<DetachedGroup> {
        events
            .into_iter()
            .filter_map(|event| match event {
                SupportEvent::Detached(group) => Some(group),
                SupportEvent::Failed(message) => panic!("worker failed: {}", message),
            })
            .collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = SupportHandle::spawn(SupportConfig::with_chunk_size(3));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bridge_collapse_reported() {
        let mut handle = SupportHandle::spawn(config()).unwrap();
        handle.load_chunk(SolidityGrid::empty(4), IVec3::ZERO).unwrap();
        handle.load_chunk(SolidityGrid::empty(4), IVec3::new(4, 0, 0)).unwrap();
        // Two blocks sticking out of the unloaded region at z >= 4.
        handle.add_block(IVec3::new(1, 1, 3)).unwrap();
        handle.add_block(IVec3::new(1, 1, 2)).unwrap();
        handle.sync_blocking().unwrap();
        assert!(detached(handle.poll_events()).is_empty());

        handle.remove_block(IVec3::new(1, 1, 3)).unwrap();
        handle.sync_blocking().unwrap();
        let groups = detached(handle.poll_events());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].positions, vec![IVec3::new(1, 1, 2)]);
        assert_eq!(handle.pending_updates(), 0);
        handle.validate_blocking().unwrap();
    }

    #[test]
    fn test_debounce_reports_without_sync() {
        let mut handle = SupportHandle::spawn(SupportConfig {
            chunk_size: 8,
            ..config()
        })
        .unwrap();
        let mut grid = SolidityGrid::empty(8);
        grid.set(IVec3::new(4, 4, 4), true);
        handle.load_chunk(grid, IVec3::ZERO).unwrap();

        match handle.next_event_blocking(Duration::from_secs(5)) {
            Some(SupportEvent::Detached(group)) => {
                assert_eq!(group.positions, vec![IVec3::new(4, 4, 4)])
            }
            other => panic!("expected a detached group, got {:?}", other),
        }
    }

    #[test]
    fn test_queries_and_stats() {
        let handle =
            SupportHandle::spawn_with_store::<CheckedPairArena<ChainId>>(config()).unwrap();
        handle
            .load_chunk(SolidityGrid::from_fn(4, |p| p.y == 0), IVec3::ZERO)
            .unwrap();
        let stats = handle.stats_blocking().unwrap();
        assert_eq!(stats.root_size, Some(4));
        assert_eq!(stats.root_chains, 1);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let report = runtime
            .block_on(handle.chain_at(IVec3::new(2, 0, 2)))
            .unwrap()
            .unwrap();
        assert!(report.touching_boundary);
        assert!(!report.supported);
        assert!(!report.detached);
        assert_eq!(report.size, 4);
        assert_eq!(runtime.block_on(handle.chain_at(IVec3::new(2, 2, 2))).unwrap(), None);
    }

    #[test]
    fn test_panic_stops_worker() {
        let mut handle = SupportHandle::spawn(config()).unwrap();
        handle
            .load_chunk(SolidityGrid::from_fn(4, |p| p.x == 0), IVec3::ZERO)
            .unwrap();
        // Air cannot be removed.
        handle.remove_block(IVec3::new(2, 2, 2)).unwrap();
        for z in 0..4 {
            // Queued behind the failing update, or rejected once it stopped.
            let _ = handle.add_block(IVec3::new(1, 1, z));
        }

        match handle.next_event_blocking(Duration::from_secs(5)) {
            Some(SupportEvent::Failed(message)) => {
                assert!(message.contains("[2, 2, 2]"), "{}", message);
                assert!(message.contains("empty region"), "{}", message);
            }
            other => panic!("expected a failure, got {:?}", other),
        }
        let client = handle.client().clone();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while (client.is_running() || client.pending_updates() > 0)
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(client.pending_updates(), 0);
        match client.sync_blocking() {
            Err(Error::WorkerFailed(message)) => assert!(message.contains("empty region")),
            other => panic!("expected the failure cause, got {:?}", other),
        }
        assert!(matches!(
            client.add_block(IVec3::ZERO),
            Err(Error::WorkerFailed(_))
        ));
        assert_eq!(client.pending_updates(), 0);
    }

    #[test]
    fn test_shutdown_joins() {
        let handle = SupportHandle::spawn(config()).unwrap();
        let client = handle.client().clone();
        handle.shutdown();
        assert!(matches!(client.add_block(IVec3::ZERO), Err(Error::WorkerStopped)));
        assert_eq!(client.pending_updates(), 0);
    }
}
