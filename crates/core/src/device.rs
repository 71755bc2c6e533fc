//! Device and browser classification from user-agent strings.
//!
//! Ordered substring matching: mobile keywords win over tablet keywords,
//! anything else is desktop. Browser tokens are checked Edge first since
//! Chromium UAs carry several product names.

use serde::{Deserialize, Serialize};

/// Device classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Desktop
    }
}

impl std::str::FromStr for DeviceType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "tablet" => Ok(Self::Tablet),
            "desktop" => Ok(Self::Desktop),
            other => Err(crate::error::Error::validation(format!(
                "unknown device type: {other}"
            ))),
        }
    }
}

const MOBILE_KEYWORDS: &[&str] = &[
    "mobile",
    "android",
    "iphone",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

const TABLET_KEYWORDS: &[&str] = &["tablet", "ipad", "playbook", "silk", "kindle"];

/// Classify a user agent into mobile/tablet/desktop.
///
/// "iPad" UAs also contain "Mobile" in some Safari versions; tablets are
/// checked first so those classify correctly.
pub fn classify_device(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_lowercase();

    if TABLET_KEYWORDS.iter().any(|k| ua.contains(k)) {
        return DeviceType::Tablet;
    }
    if MOBILE_KEYWORDS.iter().any(|k| ua.contains(k)) {
        return DeviceType::Mobile;
    }
    DeviceType::Desktop
}

/// Parsed browser name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Browser {
    pub name: String,
    pub version: String,
}

impl Browser {
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "unknown".to_string(),
        }
    }
}

/// Ordered (token to match, reported name, version token) checks.
/// Edge before Chrome before Safari before Firefox: Edge UAs contain
/// "Chrome" and "Safari", Chrome UAs contain "Safari".
const BROWSER_CHECKS: &[(&str, &str, &str)] = &[
    ("edg", "Edge", "edg/"),
    ("chrome", "Chrome", "chrome/"),
    ("safari", "Safari", "version/"),
    ("firefox", "Firefox", "firefox/"),
];

/// Parse the browser name and version from a user agent; first match wins.
pub fn parse_browser(user_agent: &str) -> Browser {
    let ua = user_agent.to_lowercase();

    for (token, name, version_token) in BROWSER_CHECKS {
        if ua.contains(token) {
            return Browser {
                name: (*name).to_string(),
                version: extract_version(&ua, version_token),
            };
        }
    }

    Browser::unknown()
}

/// Pull the numeric version after a product token like "chrome/".
fn extract_version(ua: &str, token: &str) -> String {
    let Some(start) = ua.find(token) else {
        return "unknown".to_string();
    };
    let rest = &ua[start + token.len()..];
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if version.is_empty() {
        "unknown".to_string()
    } else {
        version
    }
}
