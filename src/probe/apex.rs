//! Apex (registrable) domain extraction.
//!
//! Uses the last two labels of a host, or the last three when the final two
//! form a known multi-label public suffix (`co.uk`, `com.au`, ...). The table
//! is a small subset of the public suffix list; a missing entry makes two
//! sibling registrations look like one apex.

/// Second-level public suffixes that take a third label to be registrable.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "ltd.uk", "plc.uk", "com.au", "net.au",
    "org.au", "co.nz", "org.nz", "co.jp", "ne.jp", "or.jp", "com.br", "com.mx", "co.in",
    "co.za", "com.sg", "com.cn", "com.tr", "co.kr", "com.hk", "co.il",
];

/// Returns the apex domain of `host`, lowercased and without a trailing dot.
///
/// IP literals and single-label hosts are returned unchanged.
pub fn apex_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    let last_two = labels[labels.len() - 2..].join(".");
    let take = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len() - take..].join(".")
}
