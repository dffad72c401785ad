//! Process configuration read from environment variables.

use std::{fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::{enrichment::EnrichmentConfig, synthesis::SearchConfig, validation::ValidationLimits};

pub const DEFAULT_GRAPH_PATH: &str = "backend/data/sample_graph.json";
pub const DEFAULT_SPOTS_CSV_PATH: &str = "backend/data/sample_pois.csv";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tunables for a single route computation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub limits: ValidationLimits,
    pub search: SearchConfig,
    pub enrichment: EnrichmentConfig,
    pub average_speed_kmh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ValidationLimits::default(),
            search: SearchConfig::default(),
            enrichment: EnrichmentConfig::default(),
            average_speed_kmh: 18.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub allow_origin: String,
    pub graph_path: PathBuf,
    pub spots_csv_path: PathBuf,
    pub local_dem_path: Option<PathBuf>,
    pub snap_radius_m: f64,
    pub max_concurrent_routes: usize,
    pub queue_timeout: Duration,
    pub request_timeout: Duration,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let defaults = EngineConfig::default();

        let limits = ValidationLimits {
            max_waypoints: env.parse("MAX_WAYPOINTS", defaults.limits.max_waypoints)?,
            max_target_distance_km: env.positive(
                "MAX_TARGET_DISTANCE_KM",
                defaults.limits.max_target_distance_km,
            )?,
            max_target_elevation_gain_m: env.positive(
                "MAX_TARGET_ELEVATION_GAIN_M",
                defaults.limits.max_target_elevation_gain_m,
            )?,
        };
        let search = SearchConfig {
            max_iterations: env.parse("SEARCH_MAX_ITERATIONS", defaults.search.max_iterations)?,
            time_budget: env.millis("SEARCH_TIME_BUDGET_MS", defaults.search.time_budget)?,
            distance_tolerance: env.fraction("DISTANCE_TOLERANCE", defaults.search.distance_tolerance)?,
            elevation_tolerance: env
                .fraction("ELEVATION_TOLERANCE", defaults.search.elevation_tolerance)?,
            ..defaults.search
        };
        let enrichment = EnrichmentConfig {
            corridor_half_width_m: env.positive(
                "SPOT_SEARCH_RADIUS",
                defaults.enrichment.corridor_half_width_m,
            )?,
            max_stops: env.parse("MAX_STOPS", defaults.enrichment.max_stops)?,
            ..defaults.enrichment
        };

        Ok(Self {
            bind_addr: env.parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            allow_origin: env.get("ALLOW_ORIGIN").unwrap_or_else(|| "*".to_string()),
            graph_path: env.parse("GRAPH_PATH", PathBuf::from(DEFAULT_GRAPH_PATH))?,
            spots_csv_path: env.parse("SPOTS_CSV_PATH", PathBuf::from(DEFAULT_SPOTS_CSV_PATH))?,
            local_dem_path: env.get("LOCAL_DEM_PATH").map(PathBuf::from),
            snap_radius_m: env.positive("SNAP_RADIUS_M", 1000.0)?,
            max_concurrent_routes: env.at_least_one("MAX_CONCURRENT_ROUTES", 8)?,
            queue_timeout: env.millis("QUEUE_TIMEOUT_MS", Duration::from_millis(2000))?,
            request_timeout: env.millis("REQUEST_TIMEOUT_MS", Duration::from_millis(5000))?,
            engine: EngineConfig {
                limits,
                search,
                enrichment,
                average_speed_kmh: env.positive("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
            },
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
                key,
                reason: err.to_string(),
                value,
            }),
        }
    }

    fn checked<T>(
        &self,
        key: &'static str,
        default: T,
        valid: impl Fn(&T) -> bool,
        reason: &str,
    ) -> Result<T, ConfigError>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        let value = self.parse(key, default)?;
        if valid(&value) {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: reason.to_string(),
            })
        }
    }

    fn positive(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        self.checked(
            key,
            default,
            |value| value.is_finite() && *value > 0.0,
            "must be a positive number",
        )
    }

    fn fraction(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        self.checked(
            key,
            default,
            |value| *value > 0.0 && *value <= 1.0,
            "must be in (0, 1]",
        )
    }

    fn at_least_one(&self, key: &'static str, default: usize) -> Result<usize, ConfigError> {
        self.checked(key, default, |value| *value >= 1, "must be at least 1")
    }

    fn millis(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let millis = self.checked(
            key,
            default.as_millis() as u64,
            |value| *value > 0,
            "must be a positive number of milliseconds",
        )?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.allow_origin, "*");
        assert_eq!(config.graph_path, PathBuf::from(DEFAULT_GRAPH_PATH));
        assert_eq!(config.spots_csv_path, PathBuf::from(DEFAULT_SPOTS_CSV_PATH));
        assert!(config.local_dem_path.is_none());
        assert_eq!(config.snap_radius_m, 1000.0);
        assert_eq!(config.max_concurrent_routes, 8);
        assert_eq!(config.queue_timeout, Duration::from_millis(2000));
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.engine.limits.max_waypoints, 20);
        assert_eq!(config.engine.limits.max_target_distance_km, 300.0);
        assert_eq!(config.engine.limits.max_target_elevation_gain_m, 10_000.0);
        assert_eq!(config.engine.enrichment.corridor_half_width_m, 500.0);
        assert_eq!(config.engine.enrichment.max_stops, 10);
        assert_eq!(config.engine.average_speed_kmh, 18.0);
        assert_eq!(config.engine.search.max_iterations, 40);
        assert_eq!(config.engine.search.time_budget, Duration::from_millis(2000));
        assert_eq!(config.engine.search.distance_tolerance, 0.10);
        assert_eq!(config.engine.search.elevation_tolerance, 0.15);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("LOCAL_DEM_PATH", "/data/dem.asc"),
            ("MAX_WAYPOINTS", "5"),
            ("SPOT_SEARCH_RADIUS", "250"),
            ("DISTANCE_TOLERANCE", "0.05"),
            ("MAX_CONCURRENT_ROUTES", "2"),
            ("REQUEST_TIMEOUT_MS", "750"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.local_dem_path, Some(PathBuf::from("/data/dem.asc")));
        assert_eq!(config.engine.limits.max_waypoints, 5);
        assert_eq!(config.engine.enrichment.corridor_half_width_m, 250.0);
        assert_eq!(config.engine.search.distance_tolerance, 0.05);
        assert_eq!(config.max_concurrent_routes, 2);
        assert_eq!(config.request_timeout, Duration::from_millis(750));
    }

    #[test]
    fn blank_values_use_defaults() {
        let config = config_from(&[("LOCAL_DEM_PATH", "  "), ("MAX_STOPS", "")]).unwrap();
        assert!(config.local_dem_path.is_none());
        assert_eq!(config.engine.enrichment.max_stops, 10);
    }

    #[test]
    fn invalid_values_are_errors() {
        for (key, value) in [
            ("MAX_WAYPOINTS", "many"),
            ("AVERAGE_SPEED_KMH", "0"),
            ("AVERAGE_SPEED_KMH", "-3"),
            ("ELEVATION_TOLERANCE", "1.5"),
            ("MAX_CONCURRENT_ROUTES", "0"),
            ("QUEUE_TIMEOUT_MS", "0"),
            ("BIND_ADDR", "localhost"),
        ] {
            let err = config_from(&[(key, value)]).unwrap_err();
            let ConfigError::Invalid { key: reported, .. } = err;
            assert_eq!(reported, key);
        }
    }
}
