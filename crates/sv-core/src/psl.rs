//! Registrable-domain helpers used to compute request party
//!
//! The engine itself receives the third-party flag from its host. These
//! helpers let front ends derive it from a document URL and a request URL
//! without a full public suffix list.
//!
//! # Examples
//!
//! ```
//! use sv_core::psl::registrable_domain;
//!
//! assert_eq!(registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

/// Second-level labels open for registration, per country-code TLD.
/// Sorted by TLD.
const SECOND_LEVEL_REGISTRIES: &[(&str, &[&str])] = &[
    ("au", &["asn", "com", "edu", "gov", "id", "net", "org"]),
    ("br", &["com", "gov", "net", "org"]),
    ("cn", &["com", "edu", "gov", "net", "org"]),
    ("hk", &["com", "edu", "gov", "net", "org"]),
    ("in", &["ac", "co", "gov", "net", "org"]),
    ("jp", &["ac", "ad", "co", "ed", "go", "gr", "lg", "ne", "or"]),
    ("kr", &["ac", "co", "go", "ne", "or"]),
    ("mx", &["com", "edu", "gob", "net", "org"]),
    ("nz", &["ac", "co", "govt", "net", "org", "school"]),
    ("tw", &["com", "edu", "gov", "net", "org"]),
    ("uk", &["ac", "co", "gov", "ltd", "me", "net", "nhs", "org", "plc", "sch"]),
    ("za", &["ac", "co", "gov", "net", "org"]),
];

fn is_second_level_suffix(label: &str, tld: &str) -> bool {
    SECOND_LEVEL_REGISTRIES
        .binary_search_by(|(cc, _)| cc.cmp(&tld))
        .is_ok_and(|i| SECOND_LEVEL_REGISTRIES[i].1.contains(&label))
}

/// Registrable domain (eTLD+1) of a hostname, as a slice of the input.
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    if host.is_empty() || host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return host;
    }

    // Dots from the right: before the TLD, before the second level, ...
    let mut dots = host.rmatch_indices('.').map(|(i, _)| i);
    let (Some(tld_dot), Some(sld_dot)) = (dots.next(), dots.next()) else {
        return host;
    };
    let tld = &host[tld_dot + 1..];
    let sld = &host[sld_dot + 1..tld_dot];
    if !is_second_level_suffix(sld, tld) {
        return &host[sld_dot + 1..];
    }
    match dots.next() {
        Some(dot) => &host[dot + 1..],
        None => host,
    }
}

/// Check if a request is third-party to the document issuing it.
pub fn is_third_party(doc_host: &str, req_host: &str) -> bool {
    !registrable_domain(doc_host).eq_ignore_ascii_case(registrable_domain(req_host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrable_domain_simple() {
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn test_registrable_domain_two_part() {
        assert_eq!(registrable_domain("example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("www.example.co.uk"), "example.co.uk");
    }

    #[test]
    fn test_second_level_registries() {
        assert!(SECOND_LEVEL_REGISTRIES.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(registrable_domain("shop.example.ne.jp"), "example.ne.jp");
        assert_eq!(registrable_domain("co.uk"), "co.uk");
        // Only listed labels are suffixes
        assert_eq!(registrable_domain("www.example.uk"), "example.uk");
        assert_eq!(registrable_domain("a.co.de"), "co.de");
        assert_eq!(registrable_domain("example.com."), "example.com");
    }

    #[test]
    fn test_registrable_domain_ip() {
        assert_eq!(registrable_domain("192.168.0.1"), "192.168.0.1");
    }

    #[test]
    fn test_is_third_party() {
        assert!(!is_third_party("www.example.com", "cdn.example.com"));
        assert!(is_third_party("www.example.com", "ads.tracker.net"));
    }
}
