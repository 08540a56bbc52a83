//! Provider registry implementation
//!
//! Maps each physical source identity to the one provider reading it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::broadcast::{BroadcastConfig, Provider, Subscriber};
use crate::error::{BroadcastError, Result};
use crate::source::{ByteSource, SourceId};
use crate::stats::ProviderStats;

/// Table shared between a registry and the providers it created
pub(crate) type ProviderTable = Mutex<HashMap<SourceId, Arc<Provider>>>;

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// Registry of live providers
///
/// Lookup-or-create runs under one lock, so concurrent wraps of the same
/// source always meet on the same provider. Providers remove themselves when
/// their last subscriber closes.
#[derive(Debug)]
pub struct ProviderRegistry {
    /// Map of source identity to provider
    providers: Arc<ProviderTable>,

    /// Configuration for providers created by this registry
    config: BroadcastConfig,
}

impl ProviderRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(BroadcastConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: BroadcastConfig) -> Self {
        Self {
            providers: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static ProviderRegistry {
        GLOBAL.get_or_init(ProviderRegistry::new)
    }

    /// Get the registry configuration
    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<SourceId, Arc<Provider>>>> {
        self.providers
            .lock()
            .map_err(|_| BroadcastError::WaitFailed("registry lock poisoned".to_string()))
    }

    /// Attach a new subscriber to the provider for `source`
    ///
    /// A [`Subscriber`] already has a provider: it is handed back as is,
    /// still reading from that provider, and nothing is registered. If a
    /// provider already reads this source identity, the new subscriber
    /// joins it and `source` is released without being closed. Otherwise a
    /// provider is created and takes ownership of `source`.
    pub fn wrap<S>(&self, source: S) -> Result<Subscriber>
    where
        S: ByteSource + 'static,
    {
        let source: Box<dyn Any> = Box::new(source);
        let source = match source.downcast::<Subscriber>() {
            Ok(subscriber) => {
                tracing::debug!(
                    source = %subscriber.source_id(),
                    "Reusing provider of chained subscriber"
                );
                return Ok(*subscriber);
            }
            Err(other) => other
                .downcast::<S>()
                .map_err(|_| BroadcastError::IllegalUse("source changed type"))?,
        };

        let source_id = source.source_id();
        let mut providers = self.table()?;

        if let Some(provider) = providers.get(&source_id) {
            if let Some(id) = provider.try_attach()? {
                tracing::debug!(
                    source = %source_id,
                    "Joined existing provider"
                );
                return Ok(Subscriber::from_parts(Arc::clone(provider), id));
            }
            // Retired but not yet unregistered; it is replaced below
            tracing::debug!(source = %source_id, "Replacing retired provider");
        }

        let provider = Arc::new(Provider::new(
            source,
            &self.config,
            Some(Arc::downgrade(&self.providers)),
        ));
        let id = provider
            .try_attach()?
            .ok_or(BroadcastError::IllegalUse("new provider refused attach"))?;
        providers.insert(source_id, Arc::clone(&provider));

        tracing::info!(
            source = %source_id,
            providers = providers.len(),
            "Provider registered"
        );

        Ok(Subscriber::from_parts(provider, id))
    }

    /// Attach a new subscriber next to `parent`, sharing its provider
    pub fn wrap_subscriber(&self, parent: &Subscriber) -> Result<Subscriber> {
        parent.fork()
    }

    /// Check if a provider is registered for `source_id`
    pub fn contains(&self, source_id: SourceId) -> Result<bool> {
        Ok(self.table()?.contains_key(&source_id))
    }

    /// Get statistics for the provider of `source_id`
    pub fn stats(&self, source_id: SourceId) -> Result<Option<ProviderStats>> {
        let provider = self.table()?.get(&source_id).cloned();
        provider.map(|provider| provider.stats()).transpose()
    }

    /// Get total number of registered providers
    pub fn len(&self) -> Result<usize> {
        Ok(self.table()?.len())
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.table()?.is_empty())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a subscriber to `source` through the process-wide registry
pub fn wrap<S>(source: S) -> Result<Subscriber>
where
    S: ByteSource + 'static,
{
    ProviderRegistry::global().wrap(source)
}
