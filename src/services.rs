//! Wires configuration to concrete positioning, geocoding and cache backends.

use std::future::Future;
use std::time::Duration;

use qibla_core::{AppError, CacheBackend, Config, ConfigError};
use qibla_locate::{
    CacheStore, Coordinate, DisabledGeocoder, FileCacheStore, GeocodeError, LocationError,
    LocationStore, MemoryCacheStore, NominatimGeocoder, OrientationError, OrientationPermission,
    OrientationSensor, PermissionState, Place, PositionError, PositionOptions, PositionProvider,
    PositionReading, ReverseGeocoder, StaticPositionProvider, StoreOptions,
    UnsupportedPositionProvider,
};

#[cfg(target_os = "linux")]
use qibla_locate::GeoClueProvider;

#[cfg(target_os = "linux")]
const DESKTOP_ID: &str = "qibla";

pub type Store = LocationStore<Positioning, Geocoder, Box<dyn CacheStore>>;

/// Positioning backend chosen at startup.
pub enum Positioning {
    Manual(StaticPositionProvider),
    #[cfg(target_os = "linux")]
    GeoClue(GeoClueProvider),
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    Unsupported(UnsupportedPositionProvider),
}

impl PositionProvider for Positioning {
    fn is_supported(&self) -> bool {
        match self {
            Self::Manual(p) => p.is_supported(),
            #[cfg(target_os = "linux")]
            Self::GeoClue(p) => p.is_supported(),
            Self::Unsupported(p) => p.is_supported(),
        }
    }

    fn permission(&self) -> impl Future<Output = PermissionState> + Send {
        async move {
            match self {
                Self::Manual(p) => p.permission().await,
                #[cfg(target_os = "linux")]
                Self::GeoClue(p) => p.permission().await,
                Self::Unsupported(p) => p.permission().await,
            }
        }
    }

    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<PositionReading, PositionError>> + Send {
        async move {
            match self {
                Self::Manual(p) => p.current_position(options).await,
                #[cfg(target_os = "linux")]
                Self::GeoClue(p) => p.current_position(options).await,
                Self::Unsupported(p) => p.current_position(options).await,
            }
        }
    }
}

/// Reverse geocoding backend chosen at startup.
pub enum Geocoder {
    Nominatim(NominatimGeocoder),
    Disabled(DisabledGeocoder),
}

impl ReverseGeocoder for Geocoder {
    fn lookup(
        &self,
        coordinate: &Coordinate,
    ) -> impl Future<Output = Result<Place, GeocodeError>> + Send {
        async move {
            match self {
                Self::Nominatim(g) => g.lookup(coordinate).await,
                Self::Disabled(g) => g.lookup(coordinate).await,
            }
        }
    }
}

/// Heading source for `--headings`: events arrive on stdin, no prompt needed.
pub struct StdinOrientation;

impl OrientationSensor for StdinOrientation {
    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<OrientationPermission, OrientationError>> + Send {
        async { Ok(OrientationPermission::Granted) }
    }
}

/// Wrap a location failure for display, keeping the detail in the log.
pub fn location_error(err: LocationError) -> AppError {
    tracing::debug!("Location failure: {:?}", err);
    AppError::Location(err.user_message().to_string())
}

pub fn compass_error(err: OrientationError) -> AppError {
    tracing::debug!("Compass failure: {:?}", err);
    AppError::Location(err.user_message().to_string())
}

pub fn store_options(config: &Config) -> StoreOptions {
    let location = &config.location;
    StoreOptions {
        max_age: chrono::Duration::minutes(i64::from(location.max_age_minutes)),
        enrichment_retry: chrono::Duration::minutes(i64::from(location.enrichment_retry_minutes)),
        position: PositionOptions {
            enable_high_accuracy: location.high_accuracy,
            timeout: Duration::from_secs(u64::from(location.timeout_secs)),
            maximum_age: Duration::from_secs(u64::from(location.max_age_minutes) * 60),
        },
    }
}

fn positioning(config: &Config) -> Result<Positioning, AppError> {
    if let Some((latitude, longitude)) = config.location.manual_position() {
        let coordinate = Coordinate::new(latitude, longitude)
            .map_err(|e| ConfigError::Invalid(format!("manual location: {}", e)))?;
        tracing::info!("Using manual location {}", coordinate);
        return Ok(Positioning::Manual(StaticPositionProvider::new(coordinate)));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Positioning::GeoClue(GeoClueProvider::new(DESKTOP_ID)))
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("No location service on this platform; set a manual location in config");
        Ok(Positioning::Unsupported(UnsupportedPositionProvider))
    }
}

fn geocoder(config: &Config) -> Result<Geocoder, AppError> {
    let geocoding = &config.geocoding;
    if !geocoding.enabled {
        tracing::info!("Reverse geocoding disabled");
        return Ok(Geocoder::Disabled(DisabledGeocoder));
    }
    let geocoder = NominatimGeocoder::with_options(
        &geocoding.base_url,
        &geocoding.user_agent,
        Duration::from_secs(u64::from(geocoding.timeout_secs)),
    )
    .map_err(|e| match e {
        GeocodeError::Network(network) => AppError::Network(network),
        other => AppError::Other(anyhow::Error::new(other).context("Failed to build reverse geocoder")),
    })?;
    Ok(Geocoder::Nominatim(geocoder))
}

fn cache(config: &Config) -> Box<dyn CacheStore> {
    match config.location.cache {
        CacheBackend::Memory => Box::new(MemoryCacheStore::new()),
        CacheBackend::File => Box::new(FileCacheStore::new(&config.config_dir)),
    }
}

/// Build the location store described by `config`.
///
/// # Errors
/// `Config` for an invalid manual location, `Network` if the HTTP client
/// cannot be built.
pub fn build_store(config: &Config) -> Result<Store, AppError> {
    Ok(LocationStore::new(
        positioning(config)?,
        geocoder(config)?,
        cache(config),
        store_options(config),
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            config_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_store_options_from_config() {
        let mut config = Config::default();
        config.location.max_age_minutes = 45;
        config.location.timeout_secs = 5;
        config.location.high_accuracy = false;

        let options = store_options(&config);
        assert_eq!(options.max_age, chrono::Duration::minutes(45));
        assert_eq!(options.enrichment_retry, chrono::Duration::minutes(5));
        assert_eq!(options.position.timeout, Duration::from_secs(5));
        assert!(!options.position.enable_high_accuracy);
    }

    #[tokio::test]
    async fn test_manual_location_resolves_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.location.manual_latitude = Some(51.5074);
        config.location.manual_longitude = Some(-0.1278);
        config.geocoding.enabled = false;

        let store = build_store(&config).unwrap();
        let record = store.resolve(false).await.unwrap();

        assert_eq!(record.coordinate, Coordinate::new(51.5074, -0.1278).unwrap());
        assert!(record.city.is_unknown());
        assert!(dir.path().join("location_cache.json").exists());
    }

    #[tokio::test]
    async fn test_default_cache_survives_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.location.manual_latitude = Some(51.5074);
        config.location.manual_longitude = Some(-0.1278);
        config.geocoding.enabled = false;

        let first = build_store(&config).unwrap().resolve(false).await.unwrap();

        // A fresh store stands in for the next invocation of the binary
        let second = build_store(&config).unwrap().resolve(false).await.unwrap();
        assert_eq!(second.captured_at, first.captured_at);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let refreshed = build_store(&config).unwrap().resolve(true).await.unwrap();
        assert!(refreshed.captured_at > first.captured_at);
    }

    #[tokio::test]
    async fn test_memory_cache_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.location.manual_latitude = Some(51.5074);
        config.location.manual_longitude = Some(-0.1278);
        config.location.cache = CacheBackend::Memory;
        config.geocoding.enabled = false;

        build_store(&config).unwrap().resolve(false).await.unwrap();
        assert!(!dir.path().join("location_cache.json").exists());
    }

    #[test]
    fn test_cli_errors_carry_user_messages() {
        let err = location_error(LocationError::PermissionDenied);
        assert_eq!(
            err.user_message(),
            LocationError::PermissionDenied.user_message()
        );

        let err = compass_error(OrientationError::NoReading);
        assert_eq!(err.user_message(), OrientationError::NoReading.user_message());
    }

    #[test]
    fn test_invalid_manual_location_is_config_error() {
        let mut config = Config::default();
        config.location.manual_latitude = Some(95.0);
        config.location.manual_longitude = Some(0.0);
        let err = build_store(&config).err().unwrap();
        assert!(matches!(err, AppError::Config(ConfigError::Invalid(_))));
    }
}
