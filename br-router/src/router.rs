use std::{path::PathBuf, sync::Arc};

use arc_swap::ArcSwap;
use br_common::IsdAs;
use br_enforce::{AsMetrics, BandwidthEnforcer, ConfigError, Direction, EnforcementConfig, MetricsSink};
use br_wire::PayloadClass;
use rustc_hash::FxHashMap;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    hooks::HookSet,
    ring::{PacketPool, RingReader},
    worker::SocketWorker,
    ErrorResponder, Forwarder, PacketPipeline, ReloadError, RouterError, RouterStats,
};

/// Default number of packets a socket worker reads per batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// The ISD-AS this router belongs to.
    pub(crate) local_ia: IsdAs,
    /// Maximum number of packets read from a ring at once.
    pub(crate) batch_size: usize,
    /// Capacity of the reload command queue.
    pub(crate) reload_queue_size: usize,
    /// Number of free packet buffers kept for reuse.
    pub(crate) pool_capacity: usize,
    /// Capacity of newly allocated packet buffers.
    pub(crate) buf_size: usize,
}

impl RouterOptions {
    pub fn new(local_ia: IsdAs) -> Self {
        Self {
            local_ia,
            batch_size: DEFAULT_BATCH_SIZE,
            reload_queue_size: 8,
            pool_capacity: 4096,
            buf_size: 9000,
        }
    }

    /// Sets the maximum number of packets processed per batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn reload_queue_size(mut self, size: usize) -> Self {
        self.reload_queue_size = size.max(1);
        self
    }

    /// Sets the size of the packet buffer pool, and the capacity of new buffers.
    pub fn pool(mut self, capacity: usize, buf_size: usize) -> Self {
        self.pool_capacity = capacity;
        self.buf_size = buf_size;
        self
    }

    #[inline]
    pub fn local_ia(&self) -> IsdAs {
        self.local_ia
    }
}

/// The enforcers of both directions. Always published together, so a packet never sees the
/// ingress state of one configuration next to the egress state of another.
#[derive(Debug)]
pub struct Enforcers {
    pub ingress: BandwidthEnforcer,
    pub egress: BandwidthEnforcer,
}

impl Enforcers {
    /// Builds both enforcers. Fails without side effects if any part of `config` is invalid.
    pub fn from_config(
        config: &EnforcementConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            ingress: BandwidthEnforcer::from_config(
                Direction::Ingress,
                &config.ingress,
                config.enabled,
                Arc::clone(&metrics),
            )?,
            egress: BandwidthEnforcer::from_config(
                Direction::Egress,
                &config.egress,
                config.enabled,
                metrics,
            )?,
        })
    }

    /// Enforcers that admit everything.
    pub fn disabled() -> Self {
        Self {
            ingress: BandwidthEnforcer::disabled(Direction::Ingress),
            egress: BandwidthEnforcer::disabled(Direction::Egress),
        }
    }
}

/// A reload request, sent to a running router through a [`ReloadHandle`].
#[derive(Debug)]
pub enum ReloadCommand {
    /// Install enforcers built from the given configuration.
    Apply { config: EnforcementConfig, response: oneshot::Sender<Result<(), ReloadError>> },
    /// Load the configuration from a TOML file, then install it.
    Load { path: PathBuf, response: oneshot::Sender<Result<(), ReloadError>> },
}

/// Cloneable handle for reloading a running router's enforcement configuration.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    tx: mpsc::Sender<ReloadCommand>,
}

impl ReloadHandle {
    /// Applies `config`. On error the router keeps its previous configuration.
    pub async fn apply(&self, config: EnforcementConfig) -> Result<(), ReloadError> {
        let (response, rx) = oneshot::channel();
        self.send(ReloadCommand::Apply { config, response }, rx).await
    }

    /// Loads and applies the configuration file at `path`.
    pub async fn load(&self, path: impl Into<PathBuf>) -> Result<(), ReloadError> {
        let (response, rx) = oneshot::channel();
        self.send(ReloadCommand::Load { path: path.into(), response }, rx).await
    }

    async fn send(
        &self,
        cmd: ReloadCommand,
        rx: oneshot::Receiver<Result<(), ReloadError>>,
    ) -> Result<(), ReloadError> {
        self.tx.send(cmd).await.map_err(|_| ReloadError::Closed)?;
        rx.await.map_err(|_| ReloadError::Closed)?
    }
}

/// Owns the admission state of both directions, the socket workers and the reload task.
pub struct Router {
    id: String,
    options: RouterOptions,
    /// Current enforcers, swapped as a whole on reload.
    enforcers: Arc<ArcSwap<Enforcers>>,
    metrics: Arc<dyn MetricsSink>,
    forwarder: Arc<dyn Forwarder>,
    responder: Arc<dyn ErrorResponder>,
    handlers: FxHashMap<PayloadClass, HookSet>,
    pool: Arc<PacketPool>,
    stats: Arc<RouterStats>,
    /// Sockets registered but not yet running.
    sockets: Vec<(String, RingReader)>,
    reload_tx: mpsc::Sender<ReloadCommand>,
    reload_rx: Option<mpsc::Receiver<ReloadCommand>>,
    stop: CancellationToken,
    workers: JoinSet<()>,
    reload_task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("sockets", &self.sockets.len())
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Creates a router with enforcement disabled. Use [`Router::apply_config`] to enable it.
    pub fn new(
        id: impl Into<String>,
        options: RouterOptions,
        forwarder: impl Forwarder,
        responder: impl ErrorResponder,
    ) -> Self {
        let (reload_tx, reload_rx) = mpsc::channel(options.reload_queue_size);
        let pool = Arc::new(PacketPool::new(options.pool_capacity, options.buf_size));

        Self {
            id: id.into(),
            options,
            enforcers: Arc::new(ArcSwap::from_pointee(Enforcers::disabled())),
            metrics: Arc::new(AsMetrics::new()),
            forwarder: Arc::new(forwarder),
            responder: Arc::new(responder),
            handlers: FxHashMap::default(),
            pool,
            stats: Arc::new(RouterStats::default()),
            sockets: Vec::new(),
            reload_tx,
            reload_rx: Some(reload_rx),
            stop: CancellationToken::new(),
            workers: JoinSet::new(),
            reload_task: None,
        }
    }

    /// Sets the sink for per-AS enforcement signals. Takes effect with the next configuration.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Registers the hooks for packets of the given payload class that need local handling.
    pub fn with_handler(mut self, class: PayloadClass, hooks: HookSet) -> Self {
        self.handlers.insert(class, hooks);
        self
    }

    /// Builds new enforcers from `config`, without installing them.
    pub fn build_enforcers(&self, config: &EnforcementConfig) -> Result<Enforcers, ConfigError> {
        Enforcers::from_config(config, Arc::clone(&self.metrics))
    }

    /// Atomically replaces the current enforcers. In-flight packets finish with the old ones.
    pub fn install(&self, enforcers: Enforcers) {
        self.enforcers.store(Arc::new(enforcers));
    }

    /// Builds and installs enforcers from `config`. On error nothing changes.
    pub fn apply_config(&self, config: &EnforcementConfig) -> Result<(), RouterError> {
        self.install(self.build_enforcers(config)?);
        Ok(())
    }

    /// The enforcers currently in use.
    pub fn enforcers(&self) -> Arc<Enforcers> {
        self.enforcers.load_full()
    }

    /// Registers a socket. Its worker starts with [`Router::run`].
    pub fn add_socket(&mut self, name: impl Into<String>, ring: RingReader) -> Result<(), RouterError> {
        if self.reload_rx.is_none() {
            return Err(RouterError::Running);
        }

        self.sockets.push((name.into(), ring));
        Ok(())
    }

    /// Spawns one worker per registered socket and the reload task.
    pub fn run(&mut self) -> Result<(), RouterError> {
        let Some(reload_rx) = self.reload_rx.take() else {
            return Err(RouterError::Running);
        };

        let mut pipeline = PacketPipeline::new(
            self.options.local_ia,
            Arc::clone(&self.enforcers),
            Arc::clone(&self.forwarder),
            Arc::clone(&self.responder),
            Arc::clone(&self.stats),
        );
        for (class, hooks) in self.handlers.drain() {
            pipeline = pipeline.with_handler(class, hooks);
        }
        let pipeline = Arc::new(pipeline);

        for (name, ring) in self.sockets.drain(..) {
            let worker = SocketWorker {
                name,
                ring,
                pipeline: Arc::clone(&pipeline),
                pool: Arc::clone(&self.pool),
                stats: Arc::clone(&self.stats),
                batch_size: self.options.batch_size,
            };

            self.workers.spawn(worker.run(self.stop.clone()));
        }

        let reload = ReloadTask {
            enforcers: Arc::clone(&self.enforcers),
            metrics: Arc::clone(&self.metrics),
            commands: reload_rx,
        };
        self.reload_task = Some(tokio::spawn(reload.run(self.stop.clone())));

        info!(id = %self.id, local_ia = %self.options.local_ia, "router running");
        Ok(())
    }

    /// Returns a handle for reloading the configuration while the router runs. Before
    /// [`Router::run`] nothing would serve it, use [`Router::apply_config`] instead.
    pub fn reload_handle(&self) -> Result<ReloadHandle, RouterError> {
        if self.reload_rx.is_some() {
            return Err(RouterError::NotRunning);
        }

        Ok(ReloadHandle { tx: self.reload_tx.clone() })
    }

    /// Stops all workers and waits for them to finish their current batch.
    pub async fn shutdown(&mut self) {
        self.stop.cancel();
        self.join().await;
        info!(id = %self.id, "router stopped");
    }

    /// Waits until every socket worker has finished, e.g. because all rings were closed, then
    /// stops the reload task.
    pub async fn join(&mut self) {
        while let Some(res) = self.workers.join_next().await {
            if let Err(e) = res {
                error!(err = ?e, "socket worker failed");
            }
        }

        self.stop.cancel();
        if let Some(task) = self.reload_task.take() {
            if let Err(e) = task.await {
                error!(err = ?e, "reload task failed");
            }
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    #[inline]
    pub fn pool(&self) -> &Arc<PacketPool> {
        &self.pool
    }
}

/// Applies reload commands until the router stops.
struct ReloadTask {
    enforcers: Arc<ArcSwap<Enforcers>>,
    metrics: Arc<dyn MetricsSink>,
    commands: mpsc::Receiver<ReloadCommand>,
}

impl ReloadTask {
    async fn run(mut self, stop: CancellationToken) {
        loop {
            let cmd = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                cmd = self.commands.recv() => cmd,
            };

            let Some(cmd) = cmd else {
                return;
            };

            let (result, response) = match cmd {
                ReloadCommand::Apply { config, response } => (self.apply(&config), response),
                ReloadCommand::Load { path, response } => {
                    let result = EnforcementConfig::load(&path)
                        .map_err(ReloadError::from)
                        .and_then(|config| self.apply(&config));
                    (result, response)
                }
            };

            match &result {
                Ok(()) => info!("enforcement config reloaded"),
                Err(e) => warn!(err = %e, "error reloading enforcement config, keeping previous"),
            }

            if response.send(result).is_err() {
                debug!("reload requester went away");
            }
        }
    }

    fn apply(&self, config: &EnforcementConfig) -> Result<(), ReloadError> {
        let enforcers = Enforcers::from_config(config, Arc::clone(&self.metrics))?;
        self.enforcers.store(Arc::new(enforcers));
        Ok(())
    }
}
