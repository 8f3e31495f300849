//! Cached weather lookups backed by a remote provider.
//!
//! A [`registry::InstanceRegistry`] hands out one [`registry::WeatherService`]
//! per provider credential. Each service owns a bounded, expiring
//! [`cache::WeatherCache`], a [`coordinator::FetchCoordinator`] that fills it
//! on demand, and optionally a [`scheduler::PollingScheduler`] that refreshes
//! a fixed city list in the background.

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod provider;
pub mod record;
pub mod registry;
pub mod scheduler;

pub use cache::{CacheConfig, CacheSnapshot, WeatherCache};
pub use coordinator::FetchCoordinator;
pub use error::{ProviderError, WeatherError};
pub use provider::{FakeWeatherProvider, OpenWeatherClient, ProviderFactory, WeatherProvider};
pub use record::{normalize, RawWeather, WeatherRecord};
pub use registry::{InstanceRegistry, WeatherService};
pub use scheduler::{PollingScheduler, TickReport};
