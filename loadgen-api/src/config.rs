use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "3000")]
    pub port: u16,

    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,

    #[envconfig(from = "STRESS_BINARY", default = "stress-ng")]
    pub stress_binary: String,

    #[envconfig(from = "DEFAULT_DURATION_SECS", default = "300")]
    pub default_duration_secs: u64,

    #[envconfig(from = "MAX_DURATION_SECS", default = "86400")]
    pub max_duration_secs: u64,

    #[envconfig(from = "KILL_GRACE_MS", default = "5000")]
    pub kill_grace_ms: u64,

    #[envconfig(from = "MEMORY_THRESHOLD_PERCENT", default = "90")]
    pub memory_threshold_percent: f64,

    /// Memory budget for the health check. Unset means the total memory of the host.
    #[envconfig(from = "MEMORY_LIMIT_MB")]
    pub memory_limit_mb: Option<u64>,

    #[envconfig(from = "EXPORT_PROMETHEUS", default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_mb.map(|mb| mb * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.bind(), "0.0.0.0:3000");
        assert_eq!(config.environment, "development");
        assert_eq!(config.stress_binary, "stress-ng");
        assert_eq!(config.default_duration_secs, 300);
        assert_eq!(config.kill_grace(), Duration::from_secs(5));
        assert_eq!(config.memory_threshold_percent, 90.0);
        assert_eq!(config.memory_limit_bytes(), None);
        assert!(config.export_prometheus);
    }

    #[test]
    fn overrides() {
        let env = HashMap::from([
            ("PORT".to_owned(), "8080".to_owned()),
            ("ENVIRONMENT".to_owned(), "production".to_owned()),
            ("MEMORY_LIMIT_MB".to_owned(), "512".to_owned()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.bind(), "0.0.0.0:8080");
        assert_eq!(config.environment, "production");
        assert_eq!(config.memory_limit_bytes(), Some(512 * 1024 * 1024));
    }

    #[test]
    fn rejects_invalid_port() {
        let env = HashMap::from([("PORT".to_owned(), "not-a-port".to_owned())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
