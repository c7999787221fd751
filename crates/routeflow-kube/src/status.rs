//! Ingress status and Kubernetes Events
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! reconciliation.

use crate::error::KubeError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};
use kube::{Api, Client};
use routeflow_controller::{EventType, Result, RouteSpec, StatusSink};

/// Reporting component on published events
pub const CONTROLLER_NAME: &str = "routeflow-controller";

const ACTION: &str = "Reconcile";

pub struct KubeStatusSink {
    client: Client,
    recorder: Recorder,
}

impl KubeStatusSink {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }
}

#[async_trait]
impl StatusSink for KubeStatusSink {
    async fn record_address(&self, route: &RouteSpec, address: &str) -> Result<()> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), &route.key.namespace);
        api.patch_status(
            &route.key.name,
            &PatchParams::default(),
            &Patch::Merge(&address_patch(address)),
        )
        .await
        .map_err(KubeError::from)?;
        tracing::debug!(route = %route.key, address, "Patched ingress status");
        Ok(())
    }

    async fn record_event(
        &self,
        route: &RouteSpec,
        event_type: EventType,
        reason: &str,
        message: String,
    ) {
        let event = Event {
            type_: match event_type {
                EventType::Normal => KubeEventType::Normal,
                EventType::Warning => KubeEventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message),
            action: ACTION.to_string(),
            secondary: None,
        };
        if let Err(e) = self
            .recorder
            .publish(&event, &object_reference(route))
            .await
        {
            tracing::warn!(route = %route.key, reason, error = %e, "Failed to publish event");
        }
    }
}

/// Merge patch publishing `address` as the ingress load-balancer address
pub fn address_patch(address: &str) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "loadBalancer": {
                "ingress": [{ "ip": address }]
            }
        }
    })
}

pub fn object_reference(route: &RouteSpec) -> ObjectReference {
    ObjectReference {
        api_version: Some("networking.k8s.io/v1".to_string()),
        kind: Some("Ingress".to_string()),
        namespace: Some(route.key.namespace.clone()),
        name: Some(route.key.name.clone()),
        uid: route.uid.clone(),
        ..Default::default()
    }
}
