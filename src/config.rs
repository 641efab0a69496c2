use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "localhost:8080";
const DEFAULT_REQUEST_ID_HEADER: &str = "X-Request-Id";
const DEFAULT_CITY_HEADER: &str = "X-Appengine-City";
const DEFAULT_REGION_HEADER: &str = "X-Appengine-Region";
const DEFAULT_COUNTRY_HEADER: &str = "X-Appengine-Country";
const DEFAULT_LAT_LONG_HEADER: &str = "X-Appengine-Citylatlong";
const DEFAULT_WHOIS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DNS_TIMEOUT_SECS: u64 = 4;
const DEFAULT_LOOKUP_DEADLINE_SECS: u64 = 12;
const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Public host name, used for the CORS allow-origin header.
    pub host: String,
    /// Enables unsafe options such as the `host` override query parameter.
    pub debug: bool,
    /// Trusted header carrying the client address (e.g. "Cf-Connecting-Ip").
    /// Empty means the transport address is used.
    pub ip_header: String,
    pub request_id_header: String,
    pub city_header: String,
    pub region_header: String,
    pub country_header: String,
    pub lat_long_header: String,
    /// Headers stripped from the echoed header snapshot.
    pub disallowed_headers: Vec<String>,
    pub whois_timeout_seconds: u64,
    pub dns_timeout_seconds: u64,
    pub lookup_deadline_seconds: u64,
    pub max_response_size: usize,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub port: u16,
    pub host: String,
    pub debug: bool,
    pub ip_header: String,
    pub request_id_header: String,
    pub city_header: String,
    pub region_header: String,
    pub country_header: String,
    pub lat_long_header: String,
    pub disallowed_headers: String,
    pub whois_timeout_seconds: u64,
    pub dns_timeout_seconds: u64,
    pub lookup_deadline_seconds: u64,
    pub max_response_size: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut settings = config::Config::builder()
            .set_default("port", Self::get_default_port() as i64)?
            .set_default("host", DEFAULT_HOST)?
            .set_default("debug", false)?
            .set_default("ip_header", "")?
            .set_default("request_id_header", DEFAULT_REQUEST_ID_HEADER)?
            .set_default("city_header", DEFAULT_CITY_HEADER)?
            .set_default("region_header", DEFAULT_REGION_HEADER)?
            .set_default("country_header", DEFAULT_COUNTRY_HEADER)?
            .set_default("lat_long_header", DEFAULT_LAT_LONG_HEADER)?
            .set_default("disallowed_headers", "")?
            .set_default("whois_timeout_seconds", DEFAULT_WHOIS_TIMEOUT_SECS)?
            .set_default("dns_timeout_seconds", DEFAULT_DNS_TIMEOUT_SECS)?
            .set_default("lookup_deadline_seconds", DEFAULT_LOOKUP_DEADLINE_SECS)?
            .set_default("max_response_size", DEFAULT_MAX_RESPONSE_SIZE as i64)?;

        // Override with environment variables if present
        settings = Self::apply_env_overrides(settings)?;

        let data: ConfigData = settings.build()?.try_deserialize()?;

        Ok(Config {
            port: data.port,
            host: data.host,
            debug: data.debug,
            ip_header: data.ip_header,
            request_id_header: data.request_id_header,
            city_header: data.city_header,
            region_header: data.region_header,
            country_header: data.country_header,
            lat_long_header: data.lat_long_header,
            disallowed_headers: split_list(&data.disallowed_headers),
            whois_timeout_seconds: data.whois_timeout_seconds,
            dns_timeout_seconds: data.dns_timeout_seconds,
            lookup_deadline_seconds: data.lookup_deadline_seconds,
            max_response_size: data.max_response_size,
            start_time: Instant::now(),
        })
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_secs(self.whois_timeout_seconds)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_seconds)
    }

    pub fn lookup_deadline(&self) -> Duration {
        Duration::from_secs(self.lookup_deadline_seconds)
    }

    fn get_default_port() -> u16 {
        std::env::var("PORT")
            .or_else(|_| std::env::var("HTTP_PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    fn apply_env_overrides(mut settings: config::ConfigBuilder<config::builder::DefaultState>) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("PORT", "port"),
            ("MYIP_HOST", "host"),
            ("DEBUG", "debug"),
            ("IP_HEADER", "ip_header"),
            ("REQUEST_ID_HEADER", "request_id_header"),
            ("CITY_HEADER", "city_header"),
            ("REGION_HEADER", "region_header"),
            ("COUNTRY_HEADER", "country_header"),
            ("LAT_LONG_HEADER", "lat_long_header"),
            ("DISALLOWED_HEADERS", "disallowed_headers"),
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("DNS_TIMEOUT_SECONDS", "dns_timeout_seconds"),
            ("LOOKUP_DEADLINE_SECONDS", "lookup_deadline_seconds"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            debug: false,
            ip_header: String::new(),
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_string(),
            city_header: DEFAULT_CITY_HEADER.to_string(),
            region_header: DEFAULT_REGION_HEADER.to_string(),
            country_header: DEFAULT_COUNTRY_HEADER.to_string(),
            lat_long_header: DEFAULT_LAT_LONG_HEADER.to_string(),
            disallowed_headers: Vec::new(),
            whois_timeout_seconds: DEFAULT_WHOIS_TIMEOUT_SECS,
            dns_timeout_seconds: DEFAULT_DNS_TIMEOUT_SECS,
            lookup_deadline_seconds: DEFAULT_LOOKUP_DEADLINE_SECS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            start_time: Instant::now(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(""), Vec::<String>::new());
        assert_eq!(split_list("Cf-Ray, X-Zoo,,"), vec!["Cf-Ray", "X-Zoo"]);
    }

    #[test]
    fn test_load_with_env_override() {
        std::env::set_var("LOOKUP_DEADLINE_SECONDS", "3");
        std::env::set_var("DISALLOWED_HEADERS", "X-Cloud-Trace-Context,Cf-Ray");
        let config = Config::load().unwrap();
        std::env::remove_var("LOOKUP_DEADLINE_SECONDS");
        std::env::remove_var("DISALLOWED_HEADERS");

        assert_eq!(config.lookup_deadline(), Duration::from_secs(3));
        assert_eq!(config.disallowed_headers, vec!["X-Cloud-Trace-Context", "Cf-Ray"]);
        assert_eq!(config.whois_timeout_seconds, DEFAULT_WHOIS_TIMEOUT_SECS);
        assert_eq!(config.request_id_header, DEFAULT_REQUEST_ID_HEADER);
    }

    #[test]
    fn test_default_matches_documented_timeouts() {
        let config = Config::default();
        assert_eq!(config.whois_timeout(), Duration::from_secs(10));
        assert_eq!(config.dns_timeout(), Duration::from_secs(4));
        assert!(!config.debug);
    }
}
