//! Domain to zone-id discovery.
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::cloudflare::{CloudflareClient, RequestFailure};
use crate::settings::{SettingsDocument, SettingsError, SettingsStore, ZoneRecord, ZoneSet};

/// Last labels that mark a two-part public suffix such as `co.uk`.
///
/// A heuristic, not a public-suffix list: `example.com.br` resolves to `com.br`.
pub const MULTI_PART_TLD_MARKERS: [&str; 3] = ["uk", "au", "nz"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No domain found in app URL or CLOUDFLARE_DOMAIN env variable.")]
    NoDomainConfigured,

    #[error("No valid domains found to process.")]
    NoValidDomains,

    #[error("Errors: {}", .0.join(", "))]
    NothingResolved(Vec<String>),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Outcome of a resolve run that found at least one zone.
#[derive(Debug, Clone)]
pub struct ResolveReport {
    pub resolved: ZoneSet,
    pub errors: Vec<String>,
}

impl ResolveReport {
    pub fn message(&self) -> String {
        let domains = self.resolved.domains();
        let mut message = match domains.as_slice() {
            [single] => format!("Successfully connected to Cloudflare for domain: {single}"),
            many => format!(
                "Successfully connected to Cloudflare for {} domains: {}",
                many.len(),
                many.join(", ")
            ),
        };
        if !self.errors.is_empty() {
            message.push_str(". Some domains failed: ");
            message.push_str(&self.errors.join(", "));
        }
        message
    }
}

/// Strip subdomains from `host`, keeping three labels for `*.co.uk`-style
/// suffixes and two otherwise. Hosts with fewer than three labels pass through.
pub fn root_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return host.to_string();
    }

    let last = labels[labels.len() - 1];
    let keep = if MULTI_PART_TLD_MARKERS.contains(&last) {
        3
    } else {
        2
    };
    labels[labels.len() - keep..].join(".")
}

/// Domains to connect: the comma-separated override if set, else the host of
/// the application URL.
pub fn configured_domains(
    domain_override: Option<&str>,
    app_url: Option<&str>,
) -> Result<Vec<String>, ResolveError> {
    if let Some(list) = domain_override.filter(|s| !s.trim().is_empty()) {
        return Ok(list.split(',').map(|d| d.trim().to_string()).collect());
    }

    let host = app_url
        .and_then(|raw| Url::parse(raw.trim()).ok())
        .and_then(|url| url.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
        .ok_or(ResolveError::NoDomainConfigured)?;

    Ok(vec![host])
}

/// Reduce to root domains, dropping blanks and duplicates while keeping order.
pub fn normalize_domains<S: AsRef<str>>(domains: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(domains.len());
    for domain in domains {
        let domain = domain.as_ref().trim().trim_end_matches('.');
        if domain.is_empty() {
            continue;
        }
        let root = root_domain(&domain.to_ascii_lowercase());
        if !out.contains(&root) {
            out.push(root);
        }
    }
    out
}

/// Look up each domain's zone and persist the ones that were found.
///
/// Individual lookup failures are collected, not fatal; the call only fails
/// when nothing resolved.
pub async fn resolve<S: AsRef<str>>(
    client: &mut CloudflareClient,
    store: &SettingsStore,
    domains: &[S],
) -> Result<ResolveReport, ResolveError> {
    let domains = normalize_domains(domains);
    if domains.is_empty() {
        return Err(ResolveError::NoValidDomains);
    }

    let mut resolved = ZoneSet::new();
    let mut errors = Vec::new();

    for domain in domains {
        match client.find_zone_id(&domain).await {
            Ok(Some(zone_id)) => {
                info!(%domain, %zone_id, "resolved Cloudflare zone");
                resolved.insert(ZoneRecord::connected_now(domain, zone_id));
            }
            Ok(None) => errors.push(format!("Zone ID not found for domain: {domain}")),
            Err(RequestFailure::Decode(reason)) => {
                errors.push(format!("Error fetching zone for {domain}: {reason}"))
            }
            Err(failure) => errors.push(format!("Failed to fetch zone for {domain}: {failure}")),
        }
    }

    if resolved.is_empty() {
        warn!(?errors, "no Cloudflare zone could be resolved");
        return Err(ResolveError::NothingResolved(errors));
    }

    store
        .save(SettingsDocument::with_zones(resolved.clone()))
        .await?;

    Ok(ResolveReport { resolved, errors })
}
