//! User-agent classification: bots, automation tools, and device/browser/os.
//!
//! These are heuristics over the raw header. They only need to be good
//! enough for analytics breakdowns and filtering obvious non-humans.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::click::UNKNOWN;
use crate::types::{Device, DeviceKind};

/// Crawlers, link-preview fetchers, monitors, headless browsers, and HTTP
/// libraries.
static BOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(bot|crawl|spider|slurp|facebookexternalhit|facebookcatalog|embedly|quora link preview|outbrain|pinterest|vkshare|w3c_validator|whatsapp|skypeuripreview|preview|lighthouse|pingdom|uptime|headlesschrome|phantomjs|puppeteer|playwright|selenium|curl/|wget/|python-requests|python-urllib|aiohttp|axios/|node-fetch|go-http-client|okhttp|java/|libwww-perl|httpclient|postmanruntime)",
    )
    .expect("bot pattern is valid")
});

/// No-code automation platforms; they cannot handle non-2xx responses well.
const AUTOMATION_MARKERS: &[&str] = &["zapier", "make.com", "integromat", "n8n", "pipedream"];

/// A missing user agent counts as a bot.
pub fn is_bot(user_agent: Option<&str>) -> bool {
    match user_agent.map(str::trim) {
        None | Some("") => true,
        Some(ua) => BOT_PATTERN.is_match(ua),
    }
}

pub fn is_automation_tool(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| {
        let ua = ua.to_ascii_lowercase();
        AUTOMATION_MARKERS.iter().any(|m| ua.contains(m))
    })
}

pub fn device(user_agent: &str) -> Device {
    let kind = if user_agent.contains("iPad") || user_agent.contains("Tablet") {
        DeviceKind::Tablet
    } else if user_agent.contains("Mobi")
        || user_agent.contains("iPhone")
        || user_agent.contains("Android")
    {
        DeviceKind::Mobile
    } else {
        DeviceKind::Desktop
    };

    let (vendor, model) = if user_agent.contains("iPhone") {
        ("Apple", "iPhone")
    } else if user_agent.contains("iPad") {
        ("Apple", "iPad")
    } else if user_agent.contains("Macintosh") {
        ("Apple", "Macintosh")
    } else if user_agent.contains("Pixel") {
        ("Google", "Pixel")
    } else if user_agent.contains("SM-") || user_agent.contains("Samsung") {
        ("Samsung", UNKNOWN)
    } else {
        (UNKNOWN, UNKNOWN)
    };

    Device {
        kind,
        vendor: vendor.to_string(),
        model: model.to_string(),
    }
}

pub fn browser(user_agent: &str) -> &'static str {
    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari.
    if user_agent.contains("Edg/") {
        "Edge"
    } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
        "Opera"
    } else if user_agent.contains("SamsungBrowser/") {
        "Samsung Internet"
    } else if user_agent.contains("Firefox/") || user_agent.contains("FxiOS/") {
        "Firefox"
    } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
        "Chrome"
    } else if user_agent.contains("Safari/") {
        "Safari"
    } else {
        UNKNOWN
    }
}

pub fn os(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows NT") {
        "Windows"
    } else if user_agent.contains("iPhone OS") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Mac OS X") {
        "Mac OS"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("CrOS") {
        "Chrome OS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        UNKNOWN
    }
}
