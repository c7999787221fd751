//! Dispatch loop and node synchronization
//!
//! A single worker takes notifications off the [`WorkQueue`] and hands them
//! to the [`Reconciler`]. Next to it, a timer refreshes the ready node set
//! and re-applies pool membership of every managed route. Both share one
//! reconciliation lock so they never touch a load balancer at the same time.

use crate::collaborators::{Collaborators, EventType, StatusSink, reasons};
use crate::error::{Error, Result};
use crate::nodes::{NodeChange, NodeSetTracker};
use crate::poller::PollConfig;
use crate::queue::{Notification, NotificationKind, RateLimit, WorkQueue};
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::route::{RouteKey, RouteSpec};
use routeflow_cloud::CloudApi;
use routeflow_config::ControllerConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};

/// Entry point for change notifications
#[derive(Clone)]
pub struct NotificationSender {
    queue: WorkQueue,
}

impl NotificationSender {
    pub fn send(&self, notification: Notification) {
        tracing::debug!(
            route = %notification.key(),
            kind = ?notification.kind,
            version = %notification.route.version,
            "Queued notification"
        );
        self.queue.add(notification);
    }
}

pub struct Controller {
    queue: WorkQueue,
    reconciler: Reconciler,
    tracker: NodeSetTracker,
    routes: Mutex<HashMap<RouteKey, RouteSpec>>,
    lock: tokio::sync::Mutex<()>,
    max_retries: u32,
    node_sync_interval: Duration,
}

impl Controller {
    pub fn new(
        api: Arc<dyn CloudApi>,
        collaborators: Collaborators,
        settings: ReconcilerSettings,
        config: &ControllerConfig,
    ) -> Self {
        let tracker = NodeSetTracker::new(collaborators.nodes.clone());
        let reconciler = Reconciler::new(
            api,
            collaborators,
            tracker.subscribe(),
            settings,
            PollConfig::from(config),
        );
        Self {
            queue: WorkQueue::default(),
            reconciler,
            tracker,
            routes: Mutex::new(HashMap::new()),
            lock: tokio::sync::Mutex::new(()),
            max_retries: config.max_retries,
            node_sync_interval: config.node_sync_interval(),
        }
    }

    /// Replaces the queue's retry schedule
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.queue = WorkQueue::new(rate_limit);
        self
    }

    pub fn sender(&self) -> NotificationSender {
        NotificationSender {
            queue: self.queue.clone(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Routes the node refresh re-applies membership for, ordered by key
    pub fn managed_routes(&self) -> Vec<RouteKey> {
        let mut keys: Vec<RouteKey> = self.routes().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, HashMap<RouteKey, RouteSpec>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs until `shutdown` turns true
    ///
    /// The node set is computed once before the first notification is
    /// processed; failing to list nodes at startup is fatal.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.sync_nodes().await?;
        tracing::info!(
            nodes = self.tracker.subscribe().current().len(),
            "Controller started"
        );

        tokio::join!(
            self.node_sync_loop(shutdown.clone()),
            self.dispatch_loop(shutdown)
        );
        tracing::info!("Controller stopped");
        Ok(())
    }

    async fn dispatch_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                next = self.queue.next() => match next {
                    Some(notification) => self.process(notification).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.queue.shutdown();
    }

    async fn node_sync_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.node_sync_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_nodes().await {
                        tracing::warn!(error = %e, "Node sync failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Refreshes the ready node set and, if it changed, the pool members of
    /// every managed route
    pub async fn sync_nodes(&self) -> Result<NodeChange> {
        let _guard = self.lock.lock().await;
        let change = self.tracker.refresh().await?;
        if let NodeChange::Changed(nodes) = &change {
            let routes: Vec<RouteSpec> = self.routes().values().cloned().collect();
            for spec in &routes {
                if let Err(e) = self.reconciler.refresh_members(spec, nodes).await {
                    tracing::warn!(route = %spec.key, error = %e, "Member refresh failed");
                }
            }
        }
        Ok(change)
    }

    /// Processes one queued notification; `false` once the queue shut down
    pub async fn process_next(&self) -> bool {
        match self.queue.next().await {
            Some(notification) => {
                self.process(notification).await;
                true
            }
            None => false,
        }
    }

    async fn process(&self, notification: Notification) {
        let key = notification.key().clone();
        let result = {
            let _guard = self.lock.lock().await;
            match notification.kind {
                NotificationKind::Created | NotificationKind::Updated => {
                    self.routes()
                        .insert(key.clone(), notification.route.clone());
                    self.reconciler
                        .ensure_route(&notification.route)
                        .await
                        .map(|_| ())
                }
                NotificationKind::Deleted => {
                    self.routes().remove(&key);
                    self.reconciler.delete_route(&notification.route).await
                }
            }
        };

        match result {
            Ok(()) => self.queue.forget(&key),
            Err(e) => self.handle_failure(notification, e).await,
        }
        self.queue.done(&key);
    }

    async fn handle_failure(&self, notification: Notification, error: Error) {
        let key = notification.key().clone();
        let retries = self.queue.num_requeues(&key);

        if !error.is_permanent() && retries < self.max_retries {
            tracing::warn!(route = %key, retries, error = %error, "Reconciliation failed, retrying");
            self.queue.add_rate_limited(notification);
            return;
        }

        let message = if error.is_permanent() {
            format!("Not retrying: {}", error)
        } else {
            format!("Giving up after {} retries: {}", retries, error)
        };
        tracing::error!(route = %key, error = %error, retries, "Dropping route from the queue");
        self.queue.forget(&key);
        self.status()
            .record_event(&notification.route, EventType::Warning, reasons::GIVING_UP, message)
            .await;
    }

    fn status(&self) -> &Arc<dyn StatusSink> {
        &self.reconciler.collaborators().status
    }
}
