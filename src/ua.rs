//! User-agent classification.
//!
//! A small ordered set of patterns recognising the common browsers, command
//! line clients and crawlers. Order matters: many browsers embed other
//! browsers' tokens (Edge and Opera both claim to be Chrome and Safari), so
//! the most specific pattern is tried first.

use crate::errors::LookupError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const OTHER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Software {
    pub family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl Software {
    fn other() -> Self {
        Self::named(OTHER)
    }

    fn named(family: &str) -> Self {
        Self {
            family: family.to_string(),
            major: None,
            minor: None,
            patch: None,
        }
    }

    fn from_captures(family: &str, caps: &Captures<'_>) -> Self {
        let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        Self {
            family: family.to_string(),
            major: group(1),
            minor: group(2),
            patch: group(3),
        }
    }

    /// "60.0.3112" style version, as far as it is known.
    pub fn version(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.major, &self.minor, &self.patch]
            .into_iter()
            .map_while(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub family: String,
}

/// What a user-agent string says about the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UaClient {
    pub browser: Software,
    pub os: Software,
    pub device: Device,
}

/// User-agent sub-result. Exactly one of `client` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UaResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<UaClient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UaResult {
    pub fn classified(client: UaClient) -> Self {
        Self {
            client: Some(client),
            error: None,
        }
    }

    pub fn failure(error: &LookupError) -> Self {
        Self {
            client: None,
            error: Some(error.to_string()),
        }
    }
}

const VERSION: &str = r"(\d+)(?:\.(\d+))?(?:\.(\d+))?";

fn pattern(prefix: &str) -> Regex {
    Regex::new(&format!("{}{}", prefix, VERSION)).expect("static user agent pattern")
}

static BROWSERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("Googlebot", pattern("Googlebot/")),
        ("bingbot", pattern("bingbot/")),
        ("DuckDuckBot", pattern("DuckDuckBot/")),
        ("curl", pattern("^curl/")),
        ("Wget", pattern("^Wget/")),
        ("Edge", pattern(r"Edg(?:e|A|iOS)?/")),
        ("Opera", pattern("OPR/")),
        ("Samsung Internet", pattern("SamsungBrowser/")),
        ("Chrome Mobile iOS", pattern("CriOS/")),
        ("Firefox iOS", pattern("FxiOS/")),
        ("Firefox Mobile", pattern(r"Mobile;.*Firefox/")),
        ("Firefox", pattern("Firefox/")),
        ("Chrome Mobile", pattern(r"Android.*Chrome/")),
        ("Chrome", pattern("Chrome/")),
        ("Safari", pattern("Version/")),
        ("IE", pattern(r"(?:MSIE |Trident/.*rv:)")),
    ]
});

static SAFARI: Lazy<Regex> = Lazy::new(|| Regex::new(r"Safari/").expect("static user agent pattern"));
static MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Mobile/").expect("static user agent pattern"));

static IOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:iPhone|CPU) OS (\d+)_(\d+)(?:_(\d+))?").expect("static user agent pattern")
});
static MAC_OS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Mac OS X (\d+)[_.](\d+)(?:[_.](\d+))?").expect("static user agent pattern")
});
static ANDROID: Lazy<Regex> = Lazy::new(|| pattern("Android "));
static WINDOWS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Windows NT (\d+\.\d+)").expect("static user agent pattern")
});
static ANDROID_MODEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Android [^;)]*; (?:[a-z]{2}[-_][a-zA-Z]{2}; )?([^;)]+?)(?: Build/|\))")
        .expect("static user agent pattern")
});
static SPIDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bot|crawler|spider").expect("static user agent pattern")
});

/// Classifies a user-agent string. Unrecognised parts are reported as
/// "Other", so this never fails.
pub fn classify(user_agent: &str) -> UaClient {
    UaClient {
        browser: classify_browser(user_agent),
        os: classify_os(user_agent),
        device: classify_device(user_agent),
    }
}

fn classify_browser(ua: &str) -> Software {
    for (family, re) in BROWSERS.iter() {
        let Some(caps) = re.captures(ua) else {
            continue;
        };
        if *family == "Safari" {
            // "Version/x" alone is not enough; it must be Safari.
            if !SAFARI.is_match(ua) {
                continue;
            }
            if MOBILE.is_match(ua) {
                return Software::from_captures("Mobile Safari", &caps);
            }
        }
        return Software::from_captures(family, &caps);
    }
    Software::other()
}

fn classify_os(ua: &str) -> Software {
    if let Some(caps) = IOS.captures(ua) {
        return Software::from_captures("iOS", &caps);
    }
    if let Some(caps) = MAC_OS.captures(ua) {
        return Software::from_captures("Mac OS X", &caps);
    }
    if let Some(caps) = ANDROID.captures(ua) {
        return Software::from_captures("Android", &caps);
    }
    if let Some(caps) = WINDOWS.captures(ua) {
        let mut os = Software::named("Windows");
        os.major = windows_release(&caps[1]).map(str::to_string);
        return os;
    }
    if ua.contains("CrOS") {
        return Software::named("Chrome OS");
    }
    if ua.contains("Linux") {
        return Software::named("Linux");
    }
    Software::other()
}

fn windows_release(nt_version: &str) -> Option<&'static str> {
    match nt_version {
        "10.0" => Some("10"),
        "6.3" => Some("8.1"),
        "6.2" => Some("8"),
        "6.1" => Some("7"),
        "6.0" => Some("Vista"),
        "5.1" | "5.2" => Some("XP"),
        _ => None,
    }
}

fn classify_device(ua: &str) -> Device {
    let family = if SPIDER.is_match(ua) {
        "Spider".to_string()
    } else if ua.contains("iPhone") {
        "iPhone".to_string()
    } else if ua.contains("iPad") {
        "iPad".to_string()
    } else if let Some(caps) = ANDROID_MODEL.captures(ua) {
        caps[1].trim().to_string()
    } else {
        OTHER.to_string()
    };
    Device { family }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_on_mac() {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.113 Safari/537.36";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Chrome");
        assert_eq!(client.browser.version().as_deref(), Some("60.0.3112"));
        assert_eq!(client.os.family, "Mac OS X");
        assert_eq!(client.os.version().as_deref(), Some("10.12.6"));
        assert_eq!(client.device.family, "Other");
    }

    #[test]
    fn test_edge_is_not_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Edge");
        assert_eq!(client.browser.major.as_deref(), Some("120"));
        assert_eq!(client.os.family, "Windows");
        assert_eq!(client.os.major.as_deref(), Some("10"));
    }

    #[test]
    fn test_firefox_on_linux() {
        let ua = "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Firefox");
        assert_eq!(client.browser.version().as_deref(), Some("121.0"));
        assert_eq!(client.os, Software::named("Linux"));
    }

    #[test]
    fn test_safari_on_iphone() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1.2 Mobile/15E148 Safari/604.1";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Mobile Safari");
        assert_eq!(client.os.family, "iOS");
        assert_eq!(client.os.version().as_deref(), Some("17.1.2"));
        assert_eq!(client.device.family, "iPhone");
    }

    #[test]
    fn test_chrome_on_android_phone() {
        let ua = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Chrome Mobile");
        assert_eq!(client.os.family, "Android");
        assert_eq!(client.os.major.as_deref(), Some("10"));
        assert_eq!(client.device.family, "K");
    }

    #[test]
    fn test_command_line_clients() {
        let client = classify("curl/8.4.0");
        assert_eq!(client.browser.family, "curl");
        assert_eq!(client.browser.version().as_deref(), Some("8.4.0"));
        assert_eq!(client.os.family, "Other");

        let client = classify("Wget/1.21.4");
        assert_eq!(client.browser.family, "Wget");
    }

    #[test]
    fn test_crawler() {
        let ua = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
        let client = classify(ua);
        assert_eq!(client.browser.family, "Googlebot");
        assert_eq!(client.device.family, "Spider");
    }

    #[test]
    fn test_unknown() {
        let client = classify("SomethingElse");
        assert_eq!(client.browser, Software::other());
        assert_eq!(client.os, Software::other());
        assert_eq!(client.device.family, "Other");
        assert_eq!(client.browser.version(), None);
    }

    #[test]
    fn test_result_serialization() {
        let result = UaResult::failure(&LookupError::ClassificationUnavailable);
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"error":"No user agent supplied"}"#);
    }
}
