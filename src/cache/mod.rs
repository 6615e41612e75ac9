//! Process-wide query cache.
//!
//! Read results are cached under a [`CacheKey`] derived only from the resource
//! and its parameters. Writes go through [`QueryCache::mutate`], which looks up
//! the resources a [`Mutation`] affects in one table and invalidates all of
//! their keys once the write has succeeded.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::errors::AppError;

const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Cached resource families. A resource is the prefix of every key under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    UserRoles,
    Listings,
    Leads,
    DealerMetrics,
    LoanApplications,
    Funnel,
    Geocode,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::UserRoles => "user_roles",
            Resource::Listings => "listings",
            Resource::Leads => "leads",
            Resource::DealerMetrics => "dealer_metrics",
            Resource::LoanApplications => "loan_applications",
            Resource::Funnel => "funnel",
            Resource::Geocode => "geocode",
        }
    }

    /// How long an entry stays fresh without an invalidation.
    pub fn ttl(&self) -> Duration {
        match self {
            Resource::UserRoles => Duration::from_secs(5 * 60),
            Resource::Geocode => Duration::from_secs(24 * 60 * 60),
            Resource::Funnel => Duration::from_secs(5 * 60),
            _ => Duration::from_secs(60),
        }
    }
}

/// Identifier of a cached result: resource plus sorted parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: Resource,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Adds the parameter only when a value is present.
    pub fn opt_param<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource.as_str())?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

/// Every kind of write the service performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    IssueSession,
    EndSession,
    GrantRoles,
    CreateDealer,
    CreateListing,
    CreateEnquiry,
    UpdateEnquiryStatus,
    CreateLoanApplication,
    UpdateLoanStatus,
    CreateUploadLink,
    UploadLoanDocument,
    CreatePaymentOrder,
    NotifyDealer,
    TrackInteraction,
}

impl Mutation {
    /// The invalidation table: resources whose cached reads a write makes stale.
    pub fn invalidates(&self) -> &'static [Resource] {
        match self {
            Mutation::IssueSession => &[],
            Mutation::EndSession => &[Resource::UserRoles],
            Mutation::GrantRoles => &[Resource::UserRoles],
            Mutation::CreateDealer => &[Resource::DealerMetrics],
            Mutation::CreateListing => &[
                Resource::Listings,
                Resource::DealerMetrics,
                Resource::Leads,
            ],
            Mutation::CreateEnquiry => &[Resource::Leads, Resource::DealerMetrics],
            Mutation::UpdateEnquiryStatus => &[Resource::Leads, Resource::DealerMetrics],
            Mutation::CreateLoanApplication => {
                &[Resource::LoanApplications, Resource::DealerMetrics]
            }
            Mutation::UpdateLoanStatus => &[Resource::LoanApplications],
            Mutation::CreateUploadLink => &[],
            Mutation::UploadLoanDocument => &[Resource::LoanApplications],
            Mutation::CreatePaymentOrder => &[],
            Mutation::NotifyDealer => &[],
            Mutation::TrackInteraction => &[Resource::Funnel, Resource::Leads],
        }
    }
}

struct Entry {
    value: serde_json::Value,
    fetched_at: Instant,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    generations: HashMap<Resource, u64>,
}

impl Inner {
    fn generation(&self, resource: Resource) -> u64 {
        self.generations.get(&resource).copied().unwrap_or(0)
    }
}

/// Shared cache of read results.
pub struct QueryCache {
    inner: RwLock<Inner>,
    ttl_overrides: HashMap<Resource, Duration>,
    max_entries: usize,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl_overrides: HashMap::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    #[cfg(test)]
    pub fn with_ttl(mut self, resource: Resource, ttl: Duration) -> Self {
        self.ttl_overrides.insert(resource, ttl);
        self
    }

    #[cfg(test)]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    fn ttl(&self, resource: Resource) -> Duration {
        self.ttl_overrides
            .get(&resource)
            .copied()
            .unwrap_or_else(|| resource.ttl())
    }

    /// Return the cached value for `key`, or run `fetcher` and cache its result.
    ///
    /// A transient failure is retried once. Errors are returned as-is and
    /// nothing is cached for them.
    pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(cached) = self.lookup(key).await {
            match serde_json::from_value(cached) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {}", key, e),
            }
        }

        let generation = self.inner.read().await.generation(key.resource());

        let value = match fetcher().await {
            Ok(value) => value,
            Err(e) if e.is_transient() => {
                tracing::debug!("Retrying fetch for {} after: {}", key, e);
                fetcher().await?
            }
            Err(e) => return Err(e),
        };

        match serde_json::to_value(&value) {
            Ok(json) => self.store(key.clone(), json, generation).await,
            Err(e) => tracing::warn!("Not caching {}: {}", key, e),
        }

        Ok(value)
    }

    /// Run one write, then invalidate everything the mutation affects.
    ///
    /// On failure the cache is left untouched.
    pub async fn mutate<T, Fut>(&self, mutation: Mutation, write: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        let result = write.await?;
        for resource in mutation.invalidates() {
            self.invalidate(*resource).await;
        }
        Ok(result)
    }

    /// Drop every entry of `resource` and make in-flight fetches store stale.
    pub async fn invalidate(&self, resource: Resource) {
        let mut inner = self.inner.write().await;
        *inner.generations.entry(resource).or_insert(0) += 1;
        inner.entries.retain(|key, _| key.resource() != resource);
        tracing::debug!("Invalidated cache resource {}", resource.as_str());
    }

    /// Whether a fresh value is cached for `key`.
    #[cfg(test)]
    pub async fn is_fresh(&self, key: &CacheKey) -> bool {
        self.lookup(key).await.is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    async fn lookup(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let inner = self.inner.read().await;
        let entry = inner.entries.get(key)?;
        let current = inner.generation(key.resource());
        let expired = entry.fetched_at.elapsed() >= self.ttl(key.resource());
        if entry.generation != current || expired {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn store(&self, key: CacheKey, value: serde_json::Value, generation: u64) {
        let mut inner = self.inner.write().await;

        // Fetched before an invalidation landed: don't serve it.
        if generation != inner.generation(key.resource()) {
            return;
        }

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
                generation,
            },
        );
    }
}
