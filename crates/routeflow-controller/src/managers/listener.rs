//! Listener lifecycle

use crate::error::Result;
use crate::poller::StatusPoller;
use routeflow_cloud::{
    CloudApi, CloudError, Listener, ListenerCreate, ListenerProtocol, ListenerTlsUpdate, ResourceKind,
    expect_unique,
};
use std::sync::Arc;

/// Certificate references a listener terminates TLS with
///
/// The first reference is the default certificate; all of them are offered
/// for SNI. No references means a plain HTTP listener.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsRefs {
    refs: Vec<String>,
}

impl TlsRefs {
    pub fn new(refs: Vec<String>) -> Self {
        Self { refs }
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn protocol(&self) -> ListenerProtocol {
        if self.refs.is_empty() {
            ListenerProtocol::Http
        } else {
            ListenerProtocol::TerminatedHttps
        }
    }

    fn update(&self) -> ListenerTlsUpdate {
        ListenerTlsUpdate {
            default_tls_container_ref: self.refs.first().cloned(),
            sni_container_refs: self.refs.clone(),
        }
    }

    fn matches(&self, listener: &Listener) -> bool {
        let wanted = self.update();
        listener.default_tls_container_ref == wanted.default_tls_container_ref
            && listener.sni_container_refs == wanted.sni_container_refs
    }
}

pub struct ListenerManager {
    api: Arc<dyn CloudApi>,
    poller: StatusPoller,
}

impl ListenerManager {
    pub fn new(api: Arc<dyn CloudApi>, poller: StatusPoller) -> Self {
        Self { api, poller }
    }

    pub async fn find(&self, lb_id: &str, name: &str) -> Result<Option<Listener>> {
        let matches: Vec<Listener> = self
            .api
            .list_listeners(lb_id)
            .await?
            .into_iter()
            .filter(|l| l.name == name)
            .collect();
        Ok(expect_unique(ResourceKind::Listener, name, matches)?)
    }

    /// Converges the listener to the protocol implied by `tls`
    ///
    /// A protocol or port change cannot be applied in place, so the listener
    /// is deleted and recreated. Only the certificate references of a
    /// matching listener are updated.
    pub async fn ensure(&self, lb_id: &str, name: &str, tls: &TlsRefs) -> Result<Listener> {
        let protocol = tls.protocol();
        let port = protocol.default_port();

        if let Some(existing) = self.find(lb_id, name).await? {
            if existing.protocol == protocol && existing.protocol_port == port {
                if protocol == ListenerProtocol::TerminatedHttps && !tls.matches(&existing) {
                    self.api.update_listener_tls(&existing.id, &tls.update()).await?;
                    self.poller.wait_active(lb_id).await?;
                    tracing::info!(listener = %existing.id, "Updated listener certificates");
                    return self.refetch(lb_id, name).await;
                }
                tracing::debug!(listener = %existing.id, "Listener up to date");
                return Ok(existing);
            }

            tracing::info!(
                listener = %existing.id,
                from = existing.protocol.as_api_str(),
                to = protocol.as_api_str(),
                "Listener protocol changed, recreating"
            );
            self.api.delete_listener(&existing.id).await?;
            self.poller.wait_active(lb_id).await?;
        }

        let update = tls.update();
        let listener = self
            .api
            .create_listener(&ListenerCreate {
                name: name.to_string(),
                loadbalancer_id: lb_id.to_string(),
                protocol,
                protocol_port: port,
                default_tls_container_ref: update.default_tls_container_ref,
                sni_container_refs: update.sni_container_refs,
            })
            .await?;
        self.poller.wait_active(lb_id).await?;
        tracing::info!(
            listener = %listener.id,
            protocol = protocol.as_api_str(),
            port,
            "Created listener"
        );
        Ok(listener)
    }

    async fn refetch(&self, lb_id: &str, name: &str) -> Result<Listener> {
        self.find(lb_id, name)
            .await?
            .ok_or_else(|| CloudError::not_found(ResourceKind::Listener, name).into())
    }

    /// Deletes every listener of the load balancer
    pub async fn delete_all(&self, lb_id: &str) -> Result<usize> {
        let listeners = self.api.list_listeners(lb_id).await?;
        for listener in &listeners {
            self.poller.wait_terminal(lb_id).await?;
            match self.api.delete_listener(&listener.id).await {
                Err(e) if e.is_not_found() => continue,
                other => other?,
            }
            tracing::info!(listener = %listener.id, "Deleted listener");
        }
        self.poller.wait_terminal(lb_id).await?;
        Ok(listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollConfig;
    use routeflow_cloud::{ActionType, InMemoryCloud};

    fn setup() -> (Arc<InMemoryCloud>, ListenerManager, String) {
        let cloud = Arc::new(InMemoryCloud::new().with_settle_polls(1));
        let lb = cloud.insert_load_balancer("lb");
        let api: Arc<dyn CloudApi> = cloud.clone();
        let manager = ListenerManager::new(api.clone(), StatusPoller::new(api, PollConfig::default()));
        (cloud, manager, lb.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_listener_is_http_on_80() {
        let (cloud, listeners, lb) = setup();

        let listener = listeners.ensure(&lb, "lb", &TlsRefs::default()).await.unwrap();
        assert_eq!(listener.protocol, ListenerProtocol::Http);
        assert_eq!(listener.protocol_port, 80);

        let offset = cloud.journal().len();
        listeners.ensure(&lb, "lb", &TlsRefs::default()).await.unwrap();
        assert!(cloud.journal().since(offset).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_switch_recreates() {
        let (cloud, listeners, lb) = setup();
        let plain = listeners.ensure(&lb, "lb", &TlsRefs::default()).await.unwrap();

        let tls = TlsRefs::new(vec!["ref-a".into(), "ref-b".into()]);
        let secure = listeners.ensure(&lb, "lb", &tls).await.unwrap();

        assert_ne!(secure.id, plain.id);
        assert_eq!(secure.protocol_port, 443);
        assert_eq!(secure.default_tls_container_ref.as_deref(), Some("ref-a"));
        assert_eq!(secure.sni_container_refs, ["ref-a", "ref-b"]);
        assert_eq!(cloud.listeners().len(), 1);
        assert_eq!(
            cloud.journal().count(ActionType::Delete, ResourceKind::Listener),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_certificate_change_updates_in_place() {
        let (cloud, listeners, lb) = setup();
        let first = listeners
            .ensure(&lb, "lb", &TlsRefs::new(vec!["ref-a".into()]))
            .await
            .unwrap();

        let second = listeners
            .ensure(&lb, "lb", &TlsRefs::new(vec!["ref-b".into()]))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.default_tls_container_ref.as_deref(), Some("ref-b"));
        assert_eq!(
            cloud.journal().count(ActionType::Update, ResourceKind::Listener),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_all_is_idempotent() {
        let (cloud, listeners, lb) = setup();
        listeners.ensure(&lb, "lb", &TlsRefs::default()).await.unwrap();

        assert_eq!(listeners.delete_all(&lb).await.unwrap(), 1);
        assert_eq!(listeners.delete_all(&lb).await.unwrap(), 0);
        assert!(cloud.listeners().is_empty());
    }
}
