//! Host resolution and address canonicalization.
//!
//! The peer index is keyed by canonical addresses, so two dials that differ
//! only in hostname vs. IP must collapse to one entry. Hostname lookups go
//! through a bounded LRU that survives DNS flaps for its lifetime; lookup
//! errors are never cached.

use std::net::IpAddr;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::address::parse_address;
use crate::error::NetError;

/// Default capacity of the host lookup cache.
pub const DEFAULT_DNS_CACHE_CAPACITY: usize = 1000;

/// Resolves hostnames to numeric hosts with LRU memoization.
pub struct Resolver {
    cache: Mutex<LruCache<String, String>>,
}

impl Resolver {
    /// Creates a resolver with the given cache capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolves a host to its numeric form.
    ///
    /// IP literals pass through unchanged. DNS names resolve to the first
    /// returned record; a resolved `::1` is rewritten to `127.0.0.1` so the
    /// two loopback spellings collapse to one peer entry.
    pub async fn unify_host(&self, host: &str) -> Result<String, NetError> {
        if host.parse::<IpAddr>().is_ok() {
            return Ok(host.to_string());
        }

        if let Some(resolved) = self.cache.lock().get(host) {
            return Ok(resolved.clone());
        }

        let mut addresses = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| NetError::NameResolution(host.to_string()))?;
        let first = addresses
            .next()
            .ok_or_else(|| NetError::NameResolution(host.to_string()))?;

        let mut resolved = first.ip().to_string();
        if resolved == "::1" {
            resolved = "127.0.0.1".to_string();
        }

        debug!(host = %host, resolved = %resolved, "resolved host");
        self.cache.lock().put(host.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolves and normalizes an address to its canonical string.
    pub async fn unify_address(&self, address: &str) -> Result<String, NetError> {
        let mut info = parse_address(address)?;
        info.host = self.unify_host(&info.host).await?;
        Ok(info.to_string())
    }

    /// Filters a list of candidate peer addresses.
    ///
    /// Drops empty entries, the node's own address, unresolvable entries,
    /// and any whose canonical form duplicates an earlier one. The output
    /// preserves input order.
    pub async fn filter_peers(&self, own_address: &str, candidates: &[String]) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(own_address.to_string());

        let mut filtered = Vec::new();
        for candidate in candidates {
            if candidate.is_empty() {
                continue;
            }
            let resolved = match self.unify_address(candidate).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    debug!(address = %candidate, error = %err, "dropping unresolvable peer");
                    continue;
                }
            };
            if visited.insert(resolved.clone()) {
                filtered.push(resolved);
            }
        }
        filtered
    }

    /// Number of memoized hosts.
    pub fn cached_hosts(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_CACHE_CAPACITY)
    }
}
