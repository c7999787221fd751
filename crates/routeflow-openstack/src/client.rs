//! REST client for the OpenStack load-balancing, network and key-manager services
//!
//! Authenticates every request with a pre-issued `X-Auth-Token`. Status
//! codes are mapped onto [`CloudError`]: 404 becomes `NotFound`, 409 becomes
//! `Conflict` and every other failure an `Api` error carrying the status.

use crate::error::{OpenStackError, Result as OsResult};
use crate::wire::*;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use routeflow_cloud::{
    CloudApi, CloudError, FloatingIp, L7Policy, L7PolicyCreate, L7Rule, L7RuleCreate, Listener,
    ListenerCreate, ListenerTlsUpdate, LoadBalancer, LoadBalancerCreate, Member, MemberSpec,
    NetworkPort, Pool, PoolCreate, ResourceKind, Result, SecretCreate, SecurityGroup,
    SecurityGroupRule, SecurityGroupRuleCreate, StoredSecret, Subnet,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

const AUTH_HEADER: &str = "X-Auth-Token";

/// Base URLs of the three services
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub loadbalancer: String,
    pub network: String,
    pub key_manager: String,
}

impl Endpoints {
    fn validate(&self) -> OsResult<()> {
        for (service, url) in [
            ("loadbalancer", &self.loadbalancer),
            ("network", &self.network),
            ("key_manager", &self.key_manager),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(OpenStackError::InvalidEndpoint(format!(
                    "{} endpoint must be an http(s) URL: {:?}",
                    service, url
                )));
            }
        }
        Ok(())
    }
}

/// OpenStack implementation of [`CloudApi`]
pub struct OpenStackCloud {
    client: reqwest::Client,
    token: String,
    octavia: String,
    neutron: String,
    barbican: String,
}

impl OpenStackCloud {
    pub fn new(endpoints: Endpoints, token: impl Into<String>) -> OsResult<Self> {
        endpoints.validate()?;
        let token = token.into();
        if token.is_empty() {
            return Err(OpenStackError::MissingToken(
                "an auth token is required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("routeflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            token,
            octavia: format!("{}/v2/lbaas", endpoints.loadbalancer.trim_end_matches('/')),
            neutron: format!("{}/v2.0", endpoints.network.trim_end_matches('/')),
            barbican: format!("{}/v1", endpoints.key_manager.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTH_HEADER, &self.token)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        kind: ResourceKind,
        id: &str,
    ) -> Result<T> {
        let response = self
            .request(Method::GET, url)
            .query(query)
            .send()
            .await
            .map_err(OpenStackError::from)?;
        let response = check(response, kind, id).await?;
        Ok(response.json().await.map_err(OpenStackError::from)?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        kind: ResourceKind,
        id: &str,
    ) -> Result<T> {
        let response = self
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(OpenStackError::from)?;
        let response = check(response, kind, id).await?;
        Ok(response.json().await.map_err(OpenStackError::from)?)
    }

    /// Sends a request whose response body is ignored
    async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<()> {
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(OpenStackError::from)?;
        check(response, kind, id).await?;
        Ok(())
    }

    async fn delete(&self, url: &str, kind: ResourceKind, id: &str) -> Result<()> {
        tracing::debug!(%kind, id, "DELETE {}", url);
        self.send_unit::<()>(Method::DELETE, url, None, kind, id).await
    }
}

/// Maps an unsuccessful response onto a [`CloudError`]
async fn check(response: Response, kind: ResourceKind, id: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body, kind, id))
}

fn status_error(status: StatusCode, body: String, kind: ResourceKind, id: &str) -> CloudError {
    match status {
        StatusCode::NOT_FOUND => CloudError::not_found(kind, id),
        StatusCode::CONFLICT => CloudError::Conflict {
            kind,
            id: id.to_string(),
            message: body,
        },
        _ => OpenStackError::Status {
            service: service_of(kind),
            status: status.as_u16(),
            body,
        }
        .into(),
    }
}

fn service_of(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::LoadBalancer
        | ResourceKind::Listener
        | ResourceKind::Pool
        | ResourceKind::Member
        | ResourceKind::L7Policy
        | ResourceKind::L7Rule => "octavia",
        ResourceKind::SecurityGroup
        | ResourceKind::SecurityGroupRule
        | ResourceKind::Port
        | ResourceKind::FloatingIp
        | ResourceKind::Subnet => "neutron",
        ResourceKind::Secret => "barbican",
    }
}

#[async_trait]
impl CloudApi for OpenStackCloud {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn list_load_balancers(&self, name: &str) -> Result<Vec<LoadBalancer>> {
        let url = format!("{}/loadbalancers", self.octavia);
        let list: LoadBalancerList = self
            .get(&url, &[("name", name)], ResourceKind::LoadBalancer, name)
            .await?;
        Ok(list.loadbalancers.into_iter().map(Into::into).collect())
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        let url = format!("{}/loadbalancers/{}", self.octavia, id);
        let body: LoadBalancerBody = self.get(&url, &[], ResourceKind::LoadBalancer, id).await?;
        Ok(body.loadbalancer.into())
    }

    async fn create_load_balancer(&self, req: &LoadBalancerCreate) -> Result<LoadBalancer> {
        let url = format!("{}/loadbalancers", self.octavia);
        let body = CreateLoadBalancer {
            loadbalancer: CreateLoadBalancerBody {
                name: &req.name,
                description: &req.description,
                vip_subnet_id: &req.vip_subnet_id,
                provider: req.provider.as_deref(),
            },
        };
        let created: LoadBalancerBody = self
            .send(Method::POST, &url, &body, ResourceKind::LoadBalancer, &req.name)
            .await?;
        Ok(created.loadbalancer.into())
    }

    async fn update_load_balancer_description(&self, id: &str, description: &str) -> Result<()> {
        let url = format!("{}/loadbalancers/{}", self.octavia, id);
        let body = UpdateLoadBalancer {
            loadbalancer: UpdateDescription { description },
        };
        self.send_unit(Method::PUT, &url, Some(&body), ResourceKind::LoadBalancer, id)
            .await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let url = format!("{}/loadbalancers/{}", self.octavia, id);
        self.delete(&url, ResourceKind::LoadBalancer, id).await
    }

    async fn list_listeners(&self, loadbalancer_id: &str) -> Result<Vec<Listener>> {
        let url = format!("{}/listeners", self.octavia);
        let list: ListenerList = self
            .get(
                &url,
                &[("loadbalancer_id", loadbalancer_id)],
                ResourceKind::Listener,
                loadbalancer_id,
            )
            .await?;
        Ok(list
            .listeners
            .into_iter()
            .filter_map(ApiListener::into_model)
            .collect())
    }

    async fn create_listener(&self, req: &ListenerCreate) -> Result<Listener> {
        let url = format!("{}/listeners", self.octavia);
        let body = CreateListener {
            listener: CreateListenerBody {
                name: &req.name,
                loadbalancer_id: &req.loadbalancer_id,
                protocol: req.protocol.as_api_str(),
                protocol_port: req.protocol_port,
                default_tls_container_ref: req.default_tls_container_ref.as_deref(),
                sni_container_refs: &req.sni_container_refs,
            },
        };
        let created: ListenerBody = self
            .send(Method::POST, &url, &body, ResourceKind::Listener, &req.name)
            .await?;
        created.listener.into_model().ok_or_else(|| {
            CloudError::api(format!("listener {} created with unexpected protocol", req.name))
        })
    }

    async fn update_listener_tls(&self, id: &str, update: &ListenerTlsUpdate) -> Result<()> {
        let url = format!("{}/listeners/{}", self.octavia, id);
        let body = UpdateListener {
            listener: UpdateListenerTls {
                default_tls_container_ref: update.default_tls_container_ref.as_deref(),
                sni_container_refs: &update.sni_container_refs,
            },
        };
        self.send_unit(Method::PUT, &url, Some(&body), ResourceKind::Listener, id)
            .await
    }

    async fn delete_listener(&self, id: &str) -> Result<()> {
        let url = format!("{}/listeners/{}", self.octavia, id);
        self.delete(&url, ResourceKind::Listener, id).await
    }

    async fn list_pools(&self, loadbalancer_id: &str) -> Result<Vec<Pool>> {
        let url = format!("{}/pools", self.octavia);
        let list: PoolList = self
            .get(
                &url,
                &[("loadbalancer_id", loadbalancer_id)],
                ResourceKind::Pool,
                loadbalancer_id,
            )
            .await?;
        Ok(list.pools.into_iter().map(Into::into).collect())
    }

    async fn create_pool(&self, req: &PoolCreate) -> Result<Pool> {
        let url = format!("{}/pools", self.octavia);
        let body = CreatePool {
            pool: CreatePoolBody {
                name: &req.name,
                loadbalancer_id: match &req.listener_id {
                    Some(_) => None,
                    None => Some(req.loadbalancer_id.as_str()),
                },
                listener_id: req.listener_id.as_deref(),
                protocol: "HTTP",
                lb_algorithm: "ROUND_ROBIN",
            },
        };
        let created: PoolBody = self
            .send(Method::POST, &url, &body, ResourceKind::Pool, &req.name)
            .await?;
        let mut pool: Pool = created.pool.into();
        if pool.loadbalancer_id.is_empty() {
            pool.loadbalancer_id = req.loadbalancer_id.clone();
        }
        Ok(pool)
    }

    async fn delete_pool(&self, id: &str) -> Result<()> {
        let url = format!("{}/pools/{}", self.octavia, id);
        self.delete(&url, ResourceKind::Pool, id).await
    }

    async fn list_members(&self, pool_id: &str) -> Result<Vec<Member>> {
        let url = format!("{}/pools/{}/members", self.octavia, pool_id);
        let list: MemberList = self.get(&url, &[], ResourceKind::Pool, pool_id).await?;
        Ok(list.members.into_iter().map(Into::into).collect())
    }

    async fn replace_members(&self, pool_id: &str, members: &[MemberSpec]) -> Result<()> {
        let url = format!("{}/pools/{}/members", self.octavia, pool_id);
        let body = ReplaceMembers {
            members: members
                .iter()
                .map(|m| MemberBody {
                    name: &m.name,
                    address: &m.address,
                    protocol_port: m.protocol_port,
                })
                .collect(),
        };
        self.send_unit(Method::PUT, &url, Some(&body), ResourceKind::Pool, pool_id)
            .await
    }

    async fn list_l7_policies(&self, listener_id: &str) -> Result<Vec<L7Policy>> {
        let url = format!("{}/l7policies", self.octavia);
        let list: L7PolicyList = self
            .get(
                &url,
                &[("listener_id", listener_id)],
                ResourceKind::L7Policy,
                listener_id,
            )
            .await?;
        Ok(list.l7policies.into_iter().map(Into::into).collect())
    }

    async fn create_l7_policy(&self, req: &L7PolicyCreate) -> Result<L7Policy> {
        let url = format!("{}/l7policies", self.octavia);
        let body = CreateL7Policy {
            l7policy: CreateL7PolicyBody {
                name: &req.name,
                listener_id: &req.listener_id,
                action: "REDIRECT_TO_POOL",
                redirect_pool_id: &req.redirect_pool_id,
                position: req.position,
            },
        };
        let created: L7PolicyBody = self
            .send(Method::POST, &url, &body, ResourceKind::L7Policy, &req.name)
            .await?;
        Ok(created.l7policy.into())
    }

    async fn delete_l7_policy(&self, id: &str) -> Result<()> {
        let url = format!("{}/l7policies/{}", self.octavia, id);
        self.delete(&url, ResourceKind::L7Policy, id).await
    }

    async fn list_l7_rules(&self, policy_id: &str) -> Result<Vec<L7Rule>> {
        let url = format!("{}/l7policies/{}/rules", self.octavia, policy_id);
        let list: L7RuleList = self
            .get(&url, &[], ResourceKind::L7Policy, policy_id)
            .await?;
        Ok(list.rules.into_iter().map(Into::into).collect())
    }

    async fn create_l7_rule(&self, policy_id: &str, req: &L7RuleCreate) -> Result<L7Rule> {
        let url = format!("{}/l7policies/{}/rules", self.octavia, policy_id);
        let body = CreateL7Rule {
            rule: CreateL7RuleBody {
                rule_type: req.rule_type.as_api_str(),
                compare_type: req.compare_type.as_api_str(),
                value: &req.value,
            },
        };
        let created: L7RuleBody = self
            .send(Method::POST, &url, &body, ResourceKind::L7Rule, policy_id)
            .await?;
        Ok(created.rule.into())
    }

    async fn list_security_groups(&self, tags: &[String]) -> Result<Vec<SecurityGroup>> {
        let url = format!("{}/security-groups", self.neutron);
        let joined = tags.join(",");
        let list: SecurityGroupList = self
            .get(
                &url,
                &[("tags", joined.as_str())],
                ResourceKind::SecurityGroup,
                &joined,
            )
            .await?;
        Ok(list.security_groups)
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        let url = format!("{}/security-groups", self.neutron);
        let body = CreateSecurityGroup {
            security_group: CreateSecurityGroupBody { name, description },
        };
        let created: SecurityGroupBody = self
            .send(Method::POST, &url, &body, ResourceKind::SecurityGroup, name)
            .await?;
        Ok(created.security_group)
    }

    async fn add_security_group_tag(&self, id: &str, tag: &str) -> Result<()> {
        let url = format!("{}/security-groups/{}/tags/{}", self.neutron, id, tag);
        self.send_unit::<()>(Method::PUT, &url, None, ResourceKind::SecurityGroup, id)
            .await
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        let url = format!("{}/security-groups/{}", self.neutron, id);
        self.delete(&url, ResourceKind::SecurityGroup, id).await
    }

    async fn list_security_group_rules(
        &self,
        security_group_id: &str,
    ) -> Result<Vec<SecurityGroupRule>> {
        let url = format!("{}/security-group-rules", self.neutron);
        let list: SecurityGroupRuleList = self
            .get(
                &url,
                &[("security_group_id", security_group_id)],
                ResourceKind::SecurityGroup,
                security_group_id,
            )
            .await?;
        Ok(list.security_group_rules)
    }

    async fn create_security_group_rule(
        &self,
        req: &SecurityGroupRuleCreate,
    ) -> Result<SecurityGroupRule> {
        let url = format!("{}/security-group-rules", self.neutron);
        let body = CreateSecurityGroupRule {
            security_group_rule: req,
        };
        let created: SecurityGroupRuleBody = self
            .send(
                Method::POST,
                &url,
                &body,
                ResourceKind::SecurityGroup,
                &req.security_group_id,
            )
            .await?;
        Ok(created.security_group_rule)
    }

    async fn delete_security_group_rule(&self, id: &str) -> Result<()> {
        let url = format!("{}/security-group-rules/{}", self.neutron, id);
        self.delete(&url, ResourceKind::SecurityGroupRule, id).await
    }

    async fn list_ports(&self, device_id: &str) -> Result<Vec<NetworkPort>> {
        let url = format!("{}/ports", self.neutron);
        let list: PortList = self
            .get(&url, &[("device_id", device_id)], ResourceKind::Port, device_id)
            .await?;
        Ok(list.ports)
    }

    async fn update_port_security_groups(&self, port_id: &str, groups: &[String]) -> Result<()> {
        let url = format!("{}/ports/{}", self.neutron, port_id);
        let body = UpdatePort {
            port: UpdatePortGroups {
                security_groups: groups,
            },
        };
        self.send_unit(Method::PUT, &url, Some(&body), ResourceKind::Port, port_id)
            .await
    }

    async fn list_floating_ips(&self, port_id: &str) -> Result<Vec<FloatingIp>> {
        let url = format!("{}/floatingips", self.neutron);
        let list: FloatingIpList = self
            .get(&url, &[("port_id", port_id)], ResourceKind::FloatingIp, port_id)
            .await?;
        Ok(list.floatingips)
    }

    async fn create_floating_ip(
        &self,
        floating_network_id: &str,
        port_id: &str,
    ) -> Result<FloatingIp> {
        let url = format!("{}/floatingips", self.neutron);
        let body = CreateFloatingIp {
            floatingip: CreateFloatingIpBody {
                floating_network_id,
                port_id,
            },
        };
        let created: FloatingIpBody = self
            .send(Method::POST, &url, &body, ResourceKind::FloatingIp, port_id)
            .await?;
        Ok(created.floatingip)
    }

    async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        let url = format!("{}/floatingips/{}", self.neutron, id);
        self.delete(&url, ResourceKind::FloatingIp, id).await
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet> {
        let url = format!("{}/subnets/{}", self.neutron, id);
        let body: SubnetBody = self.get(&url, &[], ResourceKind::Subnet, id).await?;
        Ok(body.subnet)
    }

    async fn list_secrets(&self, name: &str) -> Result<Vec<StoredSecret>> {
        let url = format!("{}/secrets", self.barbican);
        let list: SecretList = self
            .get(&url, &[("name", name)], ResourceKind::Secret, name)
            .await?;
        // Barbican matches names loosely
        Ok(list
            .secrets
            .into_iter()
            .map(StoredSecret::from)
            .filter(|s| s.name == name)
            .collect())
    }

    async fn create_secret(&self, req: &SecretCreate) -> Result<StoredSecret> {
        let url = format!("{}/secrets", self.barbican);
        let created: SecretRef = self
            .send(Method::POST, &url, req, ResourceKind::Secret, &req.name)
            .await?;
        Ok(StoredSecret {
            secret_ref: created.secret_ref,
            name: req.name.clone(),
        })
    }

    async fn delete_secret(&self, secret_ref: &str) -> Result<()> {
        if !secret_ref.starts_with(&self.barbican) {
            return Err(CloudError::InvalidConfig(format!(
                "secret {} is not served by {}",
                secret_ref, self.barbican
            )));
        }
        self.delete(secret_ref, ResourceKind::Secret, secret_ref)
            .await
    }
}
