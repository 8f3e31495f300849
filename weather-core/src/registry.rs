//! Per-credential registry of weather services.
//!
//! Each provider credential maps to exactly one [`WeatherService`]: one cache,
//! one provider and at most one polling task. The registry is an ordinary
//! value owned by the application and shared by reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::cache::{CacheConfig, WeatherCache};
use crate::coordinator::FetchCoordinator;
use crate::error::WeatherError;
use crate::provider::ProviderFactory;
use crate::record::WeatherRecord;
use crate::scheduler::PollingScheduler;

// ------------------------------------------------------------------ //
//  WeatherService                                                     //
// ------------------------------------------------------------------ //

/// Shared handle for one credential.
pub struct WeatherService {
    id: Uuid,
    fingerprint: String,
    coordinator: Arc<FetchCoordinator>,
    scheduler: Option<PollingScheduler>,
}

impl WeatherService {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Short hash of the credential, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn cache(&self) -> &WeatherCache {
        self.coordinator.cache()
    }

    pub async fn get_weather(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        self.coordinator.get_weather(city).await
    }

    pub async fn refresh(&self, city: &str) -> Result<WeatherRecord, WeatherError> {
        self.coordinator.refresh(city).await
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.as_ref().is_some_and(PollingScheduler::is_running)
    }

    /// Cities refreshed by the polling task; empty when polling is disabled.
    pub fn polled_cities(&self) -> &[String] {
        self.scheduler
            .as_ref()
            .map(PollingScheduler::cities)
            .unwrap_or_default()
    }

    pub fn stop_polling(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
    }

    async fn shutdown(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }
}

/// First 12 hex characters of the credential's SHA-256.
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(12);
    hex
}

// ------------------------------------------------------------------ //
//  InstanceRegistry                                                   //
// ------------------------------------------------------------------ //

pub struct InstanceRegistry {
    factory: ProviderFactory,
    cache_config: CacheConfig,
    instances: Mutex<HashMap<String, Arc<WeatherService>>>,
}

impl InstanceRegistry {
    pub fn new(factory: ProviderFactory, cache_config: CacheConfig) -> Self {
        Self {
            factory,
            cache_config,
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<WeatherService>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the service for `credential`, creating it on first use.
    ///
    /// The polling arguments only apply when the service is created. Polling
    /// spawns a task, so this must be called from within a tokio runtime when
    /// `polling_enabled` is set.
    pub fn init(
        &self,
        credential: &str,
        polling_enabled: bool,
        period_minutes: u64,
        cities: &[String],
    ) -> Result<Arc<WeatherService>, WeatherError> {
        if credential.trim().is_empty() {
            return Err(WeatherError::InvalidInput("credential cannot be blank".into()));
        }

        let mut instances = self.lock();
        if let Some(existing) = instances.get(credential) {
            return Ok(existing.clone());
        }

        let period = if polling_enabled {
            let period = period_minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| WeatherError::Config("polling period is too large".into()))?;
            if period.is_zero() {
                return Err(WeatherError::Config("polling period must be > 0".into()));
            }
            Some(period)
        } else {
            None
        };

        let provider = (self.factory)(credential)
            .map_err(|e| WeatherError::Config(format!("failed to build weather provider: {e}")))?;
        let coordinator = Arc::new(FetchCoordinator::new(
            WeatherCache::new(self.cache_config),
            provider,
        ));

        let scheduler = match period {
            Some(period) => Some(PollingScheduler::start(
                coordinator.clone(),
                cities.to_vec(),
                period,
            )?),
            None => None,
        };

        let service = Arc::new(WeatherService {
            id: Uuid::new_v4(),
            fingerprint: fingerprint(credential),
            coordinator,
            scheduler,
        });
        info!(
            instance = %service.id,
            credential = %service.fingerprint,
            polling = polling_enabled,
            "weather service created"
        );

        instances.insert(credential.to_string(), service.clone());
        Ok(service)
    }

    pub fn get(&self, credential: &str) -> Option<Arc<WeatherService>> {
        self.lock().get(credential).cloned()
    }

    /// Unregister `credential` and stop its polling. Unknown credentials are
    /// ignored.
    pub fn remove(&self, credential: &str) {
        let removed = self.lock().remove(credential);
        if let Some(service) = removed {
            service.stop_polling();
            info!(
                instance = %service.id,
                credential = %service.fingerprint,
                "weather service removed"
            );
        }
    }

    /// Remove every service and wait for their polling tasks to exit.
    pub async fn shutdown(&self) {
        let services: Vec<_> = self.lock().drain().map(|(_, s)| s).collect();
        for service in services {
            service.shutdown().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{FakeWeatherProvider, WeatherProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory handing out `fake` for every credential and counting builds.
    fn counting_factory(fake: &FakeWeatherProvider) -> (ProviderFactory, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let fake = fake.clone();
        let factory: ProviderFactory = Arc::new(
            move |_key: &str| -> Result<Arc<dyn WeatherProvider>, ProviderError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(fake.clone()))
            },
        );
        (factory, builds)
    }

    fn registry(fake: &FakeWeatherProvider) -> (InstanceRegistry, Arc<AtomicUsize>) {
        let (factory, builds) = counting_factory(fake);
        (InstanceRegistry::new(factory, CacheConfig::default()), builds)
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn same_credential_returns_same_instance() {
        let fake = FakeWeatherProvider::new();
        let (registry, builds) = registry(&fake);

        let first = registry.init("KEY_123", false, 10, &cities(&["London"])).unwrap();
        let second = registry.init("KEY_123", true, 10, &cities(&["Paris"])).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id(), second.id());
        assert!(!second.is_polling());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn different_credentials_do_not_share_a_cache() {
        let fake = FakeWeatherProvider::new();
        let (registry, _) = registry(&fake);

        let k1 = registry.init("K1", false, 10, &[]).unwrap();
        let k2 = registry.init("K2", false, 10, &[]).unwrap();
        assert!(!Arc::ptr_eq(&k1, &k2));

        k1.get_weather("London").await.unwrap();
        assert_eq!(k1.cache().len(), 1);
        assert!(k2.cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_init_constructs_once() {
        let fake = FakeWeatherProvider::new();
        let (registry, builds) = registry(&fake);
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.init("K1", false, 10, &[]).unwrap() })
            })
            .collect();

        let mut services = Vec::with_capacity(tasks.len());
        for task in tasks {
            services.push(task.await.unwrap());
        }

        assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_service_refreshes_and_stops_on_remove() {
        let fake = FakeWeatherProvider::new();
        let (registry, _) = registry(&fake);

        let service = registry.init("K1", true, 1, &cities(&["X", "Y"])).unwrap();
        assert!(service.is_polling());
        assert_eq!(service.polled_cities(), ["X", "Y"]);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fake.calls(), vec!["X", "Y"]);

        registry.remove("K1");
        assert!(!service.is_polling());
        assert!(registry.get("K1").is_none());

        tokio::time::advance(Duration::from_secs(300)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fake.total_calls(), 2);
    }

    #[tokio::test]
    async fn remove_unknown_is_noop_and_reinit_creates_fresh_instance() {
        let fake = FakeWeatherProvider::new();
        let (registry, builds) = registry(&fake);

        registry.remove("missing");
        let first = registry.init("K1", false, 10, &[]).unwrap();
        registry.remove("K1");
        registry.remove("K1");
        let second = registry.init("K1", false, 10, &[]).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejects_invalid_arguments() {
        let fake = FakeWeatherProvider::new();
        let (registry, builds) = registry(&fake);

        assert!(matches!(
            registry.init("  ", false, 10, &[]),
            Err(WeatherError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.init("K1", true, 0, &cities(&["X"])),
            Err(WeatherError::Config(_))
        ));
        assert!(registry.is_empty());

        // The period is irrelevant without polling.
        assert!(registry.init("K1", false, 0, &[]).is_ok());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_build_failure_is_a_config_error() {
        let factory: ProviderFactory = Arc::new(
            |_key: &str| -> Result<Arc<dyn WeatherProvider>, ProviderError> {
                Err(ProviderError::Unavailable("no TLS backend".into()))
            },
        );
        let registry = InstanceRegistry::new(factory, CacheConfig::default());

        assert!(matches!(
            registry.init("K1", false, 10, &[]),
            Err(WeatherError::Config(_))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_empties_registry() {
        let fake = FakeWeatherProvider::new();
        let (registry, _) = registry(&fake);
        let polling = registry.init("K1", true, 5, &cities(&["X"])).unwrap();
        registry.init("K2", false, 5, &[]).unwrap();

        registry.shutdown().await;
        assert!(registry.is_empty());
        assert!(!polling.is_polling());
    }

    #[test]
    fn fingerprint_hides_the_credential() {
        let fp = fingerprint("super-secret-key");
        assert_eq!(fp.len(), 12);
        assert!(!fp.contains("secret"));
        assert_eq!(fp, fingerprint("super-secret-key"));
        assert_ne!(fp, fingerprint("other-key"));
    }
}
