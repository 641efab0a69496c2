use crate::{config::Config, errors::LookupError, headers::HeaderSnapshot};
use serde::{Deserialize, Serialize};

/// Location data provided by the edge (CDN or load balancer) headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    /// Only set when the extraction could not finish before the deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocationResult {
    pub fn failure(error: &LookupError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Parses a "lat,long" pair such as "37.562992,-122.325525".
pub fn parse_lat_long(value: &str) -> Result<(f64, f64), LookupError> {
    let (lat, long) = value
        .split_once(',')
        .ok_or_else(|| LookupError::Parse(format!("lat/long is not separated by a comma: {:?}", value)))?;

    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|e| LookupError::Parse(format!("bad latitude {:?}: {}", lat, e)))?;
    let long = long
        .trim()
        .parse::<f64>()
        .map_err(|e| LookupError::Parse(format!("bad longitude {:?}: {}", long, e)))?;

    Ok((lat, long))
}

/// Reads the configured location headers. Missing or malformed headers are
/// left out; this never fails.
pub fn extract(config: &Config, headers: &HeaderSnapshot) -> LocationResult {
    let text = |name: &str| {
        headers
            .get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let (lat, long) = match headers.get(&config.lat_long_header).map(parse_lat_long) {
        Some(Ok((lat, long))) => (Some(lat), Some(long)),
        _ => (None, None),
    };

    LocationResult {
        city: text(&config.city_header),
        region: text(&config.region_header),
        country: text(&config.country_header),
        lat,
        long,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lat_long() {
        let (lat, long) = parse_lat_long("37.562992,-122.325525").unwrap();
        assert_eq!(lat, 37.562992);
        assert_eq!(long, -122.325525);

        assert!(matches!(parse_lat_long("37.5"), Err(LookupError::Parse(_))));
        assert!(matches!(parse_lat_long("north,-122.3"), Err(LookupError::Parse(_))));
    }

    #[test]
    fn test_extract_from_headers() {
        let config = Config::default();
        let headers: HeaderSnapshot = [
            ("X-Appengine-City", "san mateo"),
            ("X-Appengine-Region", "ca"),
            ("X-Appengine-Country", "US"),
            ("X-Appengine-Citylatlong", "37.562992,-122.325525"),
        ]
        .into_iter()
        .collect();

        let location = extract(&config, &headers);

        assert_eq!(location.city.as_deref(), Some("san mateo"));
        assert_eq!(location.region.as_deref(), Some("ca"));
        assert_eq!(location.country.as_deref(), Some("US"));
        assert_eq!(location.lat, Some(37.562992));
        assert_eq!(location.long, Some(-122.325525));
        assert_eq!(location.error, None);
    }

    #[test]
    fn test_extract_ignores_missing_and_malformed() {
        let config = Config::default();
        let headers: HeaderSnapshot = [("X-Appengine-City", "  "), ("X-Appengine-Citylatlong", "0.0")]
            .into_iter()
            .collect();

        assert_eq!(extract(&config, &headers), LocationResult::default());
    }
}
