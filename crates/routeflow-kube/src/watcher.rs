//! Ingress watcher feeding the controller queue
//!
//! Watches Ingress objects cluster-wide and turns the ones of our class into
//! notifications. Updates that leave the desired route unchanged (status
//! patches, unrelated annotations) are dropped here so they never cause a
//! pass.

use crate::ingress::{ingress_to_route, is_managed, route_key};
use futures_util::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, watcher};
use kube::{Api, Client};
use routeflow_config::Config;
use routeflow_controller::{Notification, NotificationSender, RouteKey, RouteSpec};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Routes seen so far, keyed by ingress identity
pub struct IngressState {
    cluster: String,
    ingress_class: String,
    seen: HashMap<RouteKey, RouteSpec>,
    /// Managed ingresses that do not yield a valid route; already torn down
    invalid: HashSet<RouteKey>,
    /// Keys listed since the last `Init`, while a relist is in progress
    relisted: Option<HashSet<RouteKey>>,
}

impl IngressState {
    pub fn new(cluster: impl Into<String>, ingress_class: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ingress_class: ingress_class.into(),
            seen: HashMap::new(),
            invalid: HashSet::new(),
            relisted: None,
        }
    }

    /// Notification for an added or modified ingress, if one is due
    ///
    /// An ingress that moved to another class is reported as deleted, and so
    /// is one that no longer describes a valid route.
    pub fn apply(&mut self, ingress: &Ingress) -> Option<Notification> {
        let key = route_key(ingress);
        if let Some(relisted) = self.relisted.as_mut() {
            relisted.insert(key.clone());
        }
        if !is_managed(ingress, &self.ingress_class) {
            self.invalid.remove(&key);
            let previous = self.seen.remove(&key)?;
            info!(route = %key, "Ingress left our class");
            return Some(Notification::deleted(previous));
        }

        let converted = ingress_to_route(ingress, &self.cluster)
            .map_err(|e| e.to_string())
            .and_then(|route| route.validate().map(|_| route).map_err(|e| e.to_string()));
        let route = match converted {
            Ok(route) => route,
            Err(reason) => return self.invalidate(key, reason),
        };
        self.invalid.remove(&key);

        match self.seen.insert(key.clone(), route.clone()) {
            None => Some(Notification::created(route)),
            Some(previous) if same_intent(&previous, &route) => {
                debug!(route = %key, version = %route.version, "Desired state unchanged");
                None
            }
            Some(_) => Some(Notification::updated(route)),
        }
    }

    /// Tears down whatever an invalid ingress was serving, once
    ///
    /// Without a prior route (first sight, or after a restart) teardown goes
    /// by the derived names, which is a no-op when nothing was provisioned.
    fn invalidate(&mut self, key: RouteKey, reason: String) -> Option<Notification> {
        let previous = self.seen.remove(&key);
        if !self.invalid.insert(key.clone()) && previous.is_none() {
            debug!(route = %key, error = %reason, "Ingress still invalid");
            return None;
        }
        warn!(route = %key, error = %reason, "Ingress is invalid, removing its route");
        let route = previous
            .unwrap_or_else(|| RouteSpec::new(key, self.cluster.clone(), String::new()));
        Some(Notification::deleted(route))
    }

    /// Notification for a deleted ingress
    pub fn delete(&mut self, ingress: &Ingress) -> Option<Notification> {
        let key = route_key(ingress);
        self.invalid.remove(&key);
        if let Some(previous) = self.seen.remove(&key) {
            return Some(Notification::deleted(previous));
        }
        if !is_managed(ingress, &self.ingress_class) {
            return None;
        }
        // Teardown only needs the derived names
        let route = ingress_to_route(ingress, &self.cluster).unwrap_or_else(|_| {
            RouteSpec::new(key, self.cluster.clone(), String::new())
        });
        Some(Notification::deleted(route))
    }

    /// Starts a relist; the listing that follows replaces what was seen
    pub fn begin_relist(&mut self) {
        self.relisted = Some(HashSet::new());
    }

    /// Ends a relist, deleting routes whose ingress was not listed again
    ///
    /// Ingresses removed while the watch was down never produce a delete
    /// event, so they are only noticed here.
    pub fn finish_relist(&mut self) -> Vec<Notification> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };
        self.invalid.retain(|key| relisted.contains(key));
        let gone: Vec<RouteKey> = self
            .seen
            .keys()
            .filter(|key| !relisted.contains(*key))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|key| self.seen.remove(&key))
            .map(|previous| {
                info!(route = %previous.key, "Ingress disappeared while the watch was down");
                Notification::deleted(previous)
            })
            .collect()
    }
}

fn same_intent(a: &RouteSpec, b: &RouteSpec) -> bool {
    let unversioned = |route: &RouteSpec| RouteSpec {
        version: String::new(),
        ..route.clone()
    };
    unversioned(a) == unversioned(b)
}

pub struct IngressWatcher {
    client: Client,
    state: IngressState,
    sender: NotificationSender,
}

impl IngressWatcher {
    pub fn new(client: Client, config: &Config, sender: NotificationSender) -> Self {
        Self {
            client,
            state: IngressState::new(&config.cluster_name, &config.ingress_class),
            sender,
        }
    }

    /// Watches until the stream ends
    pub async fn run(mut self) {
        let api: Api<Ingress> = Api::all(self.client.clone());
        let mut stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        info!(class = %self.state.ingress_class, "Ingress watcher started");

        while let Some(event) = stream.next().await {
            let notifications: Vec<Notification> = match event {
                Ok(watcher::Event::Apply(ingress)) | Ok(watcher::Event::InitApply(ingress)) => {
                    self.state.apply(&ingress).into_iter().collect()
                }
                Ok(watcher::Event::Delete(ingress)) => {
                    self.state.delete(&ingress).into_iter().collect()
                }
                Ok(watcher::Event::Init) => {
                    debug!("Ingress watcher (re)listing");
                    self.state.begin_relist();
                    Vec::new()
                }
                Ok(watcher::Event::InitDone) => {
                    let gone = self.state.finish_relist();
                    info!(
                        routes = self.state.seen.len(),
                        removed = gone.len(),
                        "Ingress watcher initialized"
                    );
                    gone
                }
                Err(e) => {
                    warn!(error = %e, "Ingress watch error");
                    Vec::new()
                }
            };
            for notification in notifications {
                self.sender.send(notification);
            }
        }

        warn!("Ingress watch stream ended");
    }
}
