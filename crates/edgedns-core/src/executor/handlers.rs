//! Task handlers
//!
//! Each handler re-reads the current inventory and drives the provider
//! toward it, so running a handler twice is harmless. Missing subjects
//! finish the task without contacting a provider.

use super::DnsTaskExecutor;
use crate::cache::CachedProvider;
use crate::error::Result;
use crate::record::{Record, RecordKey, RecordType};
use crate::traits::{DnsDomain, DnsProvider, DnsTask, DnsTaskKind};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, info, warn};

impl DnsTaskExecutor {
    /// Bind or unbind a server's CNAME alias to its cluster
    pub(super) async fn handle_server_change(&self, task: &DnsTask, server_id: i64) -> Result<()> {
        let Some(server) = self.inventory.find_server(server_id).await? else {
            debug!("Server {} not found, nothing to do", server_id);
            return Ok(());
        };
        if server.dns_name.is_empty() {
            debug!("Server {} has no DNS name", server_id);
            return Ok(());
        }

        let Some(cluster) = self.inventory.find_cluster(server.cluster_id).await? else {
            debug!("Cluster {} of server {} not found", server.cluster_id, server_id);
            return Ok(());
        };
        if cluster.dns_name.is_empty() || cluster.dns_domain_id <= 0 {
            debug!("Cluster {} has no DNS binding", cluster.id);
            return Ok(());
        }

        let Some(domain) = self.find_active_domain(cluster.dns_domain_id).await? else {
            return Ok(());
        };
        let Some(provider) = self.provider_for(&domain).await? else {
            return Ok(());
        };

        let record_name = server.dns_name.as_str();
        let value = format!("{}.{}.", cluster.dns_name, domain.name);
        let route = provider.default_route();

        if !server.is_on {
            if let Some(existing) = provider
                .query_record(&domain.name, record_name, &RecordType::Cname)
                .await?
            {
                provider.delete_record(&domain.name, &existing).await?;
                info!(
                    "Deleted CNAME {}.{} -> {} (server {} disabled)",
                    record_name, domain.name, existing.value, server_id
                );
                self.cascade(task, DnsTaskKind::DomainChange { domain_id: domain.id })
                    .await?;
            }
            return Ok(());
        }

        if self
            .inventory
            .exist_domain_record(domain.id, record_name, &RecordType::Cname, &route, &value)
            .await?
        {
            debug!("CNAME {}.{} already bound", record_name, domain.name);
            return Ok(());
        }

        let mut cascaded = false;
        if let Some(existing) = provider
            .query_record(&domain.name, record_name, &RecordType::Cname)
            .await?
        {
            if existing.value_matches(&value) {
                debug!("CNAME {}.{} already points to {}", record_name, domain.name, value);
                return Ok(());
            }

            provider.delete_record(&domain.name, &existing).await?;
            info!(
                "Deleted stale CNAME {}.{} -> {}",
                record_name, domain.name, existing.value
            );
            self.cascade(task, DnsTaskKind::DomainChange { domain_id: domain.id })
                .await?;
            cascaded = true;
        }

        let record = Record::new(record_name, RecordType::Cname, &value, &route).with_ttl(cluster.ttl);
        provider.add_record(&domain.name, &record).await?;
        info!("Added CNAME {}.{} -> {}", record_name, domain.name, value);

        if !cascaded {
            self.cascade(task, DnsTaskKind::DomainChange { domain_id: domain.id })
                .await?;
        }
        Ok(())
    }

    /// Forward a node change to its cluster
    pub(super) async fn handle_node_change(&self, task: &DnsTask, node_id: i64) -> Result<()> {
        let Some(node) = self.inventory.find_node(node_id).await? else {
            debug!("Node {} not found, nothing to do", node_id);
            return Ok(());
        };
        match node.cluster_id {
            Some(cluster_id) if cluster_id > 0 => {
                self.cascade(task, DnsTaskKind::ClusterChange { cluster_id })
                    .await
            }
            _ => {
                debug!("Node {} belongs to no cluster", node_id);
                Ok(())
            }
        }
    }

    /// Converge a cluster's A/AAAA records on its healthy node addresses
    pub(super) async fn handle_cluster_change(&self, task: &DnsTask, cluster_id: i64) -> Result<()> {
        let Some(cluster) = self.inventory.find_cluster(cluster_id).await? else {
            debug!("Cluster {} not found, nothing to do", cluster_id);
            return Ok(());
        };
        if cluster.dns_name.is_empty() || cluster.dns_domain_id <= 0 {
            debug!("Cluster {} has no DNS binding", cluster_id);
            return Ok(());
        }

        let Some(domain) = self.find_active_domain(cluster.dns_domain_id).await? else {
            return Ok(());
        };
        let Some(provider) = self.provider_for(&domain).await? else {
            return Ok(());
        };

        let old_records: Vec<Record> = provider
            .get_records(&domain.name)
            .await?
            .into_iter()
            .filter(|r| r.name == cluster.dns_name && r.record_type.is_address())
            .collect();
        let old_keys: HashSet<RecordKey> = old_records.iter().map(Record::canonical_key).collect();

        let default_route = provider.default_route();
        let mut kept: HashSet<RecordKey> = HashSet::new();
        let mut changed = false;

        for node in self.inventory.find_cluster_nodes(cluster.id).await? {
            if !node.is_publishable() {
                continue;
            }

            let mut routes = node.routes_for(domain.id).to_vec();
            if routes.is_empty() {
                routes.push(default_route.clone());
            }

            for address in node.addresses.iter().filter(|a| a.is_on && a.is_up) {
                let ip: IpAddr = match address.ip.trim().parse() {
                    Ok(ip) => ip,
                    Err(_) => {
                        warn!("Node {} has an invalid address '{}', skipping", node.id, address.ip);
                        continue;
                    }
                };
                let value = ip.to_string();

                for route in &routes {
                    let key = RecordKey::new(route, &value);
                    if kept.contains(&key) {
                        continue;
                    }
                    if !old_keys.contains(&key) {
                        let record =
                            Record::new(&cluster.dns_name, RecordType::for_ip(&ip), &value, route)
                                .with_ttl(cluster.ttl);
                        provider.add_record(&domain.name, &record).await?;
                        info!(
                            "Added {} {}.{} -> {}",
                            record.record_type, cluster.dns_name, domain.name, key
                        );
                        changed = true;
                    }
                    kept.insert(key);
                }
            }
        }

        for record in old_records.iter().filter(|r| !kept.contains(&r.canonical_key())) {
            provider.delete_record(&domain.name, record).await?;
            info!(
                "Deleted {} {}.{} -> {}",
                record.record_type,
                cluster.dns_name,
                domain.name,
                record.key()
            );
            changed = true;
        }

        if changed {
            self.cascade(task, DnsTaskKind::DomainChange { domain_id: domain.id })
                .await?;
        } else {
            debug!("Cluster {} records already converged", cluster_id);
        }
        Ok(())
    }

    /// Refresh a domain's durable record snapshot
    pub(super) async fn handle_domain_change(&self, domain_id: i64) -> Result<()> {
        let Some(domain) = self.find_active_domain(domain_id).await? else {
            return Ok(());
        };
        let Some(provider) = self.provider_for(&domain).await? else {
            return Ok(());
        };

        let records = provider.get_records(&domain.name).await?;
        self.inventory
            .update_domain_records(domain.id, &records)
            .await?;
        info!("Refreshed {} record(s) of {}", records.len(), domain.name);
        Ok(())
    }

    /// Look up an enabled domain
    async fn find_active_domain(&self, domain_id: i64) -> Result<Option<DnsDomain>> {
        match self.inventory.find_domain(domain_id).await? {
            Some(domain) if domain.is_on => Ok(Some(domain)),
            Some(_) => {
                debug!("Domain {} is disabled", domain_id);
                Ok(None)
            }
            None => {
                debug!("Domain {} not found", domain_id);
                Ok(None)
            }
        }
    }

    /// Build the cached provider hosting `domain`
    async fn provider_for(&self, domain: &DnsDomain) -> Result<Option<CachedProvider>> {
        let Some(config) = self.inventory.find_provider(domain.provider_id).await? else {
            warn!(
                "Provider {} of domain {} not found",
                domain.provider_id, domain.name
            );
            return Ok(None);
        };

        let inner = self.registry.create_provider(&config)?;
        Ok(Some(CachedProvider::new(
            config.id,
            inner,
            self.cache.clone(),
        )))
    }
}
