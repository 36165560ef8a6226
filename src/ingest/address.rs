// src/ingest/address.rs
//! Heuristic address extraction and summary cleanup for alert descriptions.
//!
//! Alert descriptions usually open with a location ("7500 Block of 15th Ave NE")
//! followed by boilerplate ("Reported to UWPD:") and an occurrence timestamp.
//! Everything here is best-effort text matching; misses simply leave fields as
//! they are.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\d{2,4}\s*(?:block of)?\s+[\w\s.-]+\s+(?:Ave|St|Rd|Way|Blvd|Pl|Ct|Dr|Ln|Pkwy|Cir|Sq|Ter|Trl|NE|NW|SE|SW|N|S|E|W)\b\.?",
    )
    .expect("address regex")
});

static RE_REPORTED_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\breported to\s+(?:uwpd\b:?|[\w.]+(?:\s+[\w.]+)?\s*:)").expect("reported-to regex")
});

static RE_OCCURRED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\boccurred\s+\w+\s+\d+/\d+/\d{2,4}\s+at\s+\d{1,2}:\d{2}\s+[APM]{2}\.",
    )
    .expect("occurred regex")
});

/// A located address fragment. `start..end` is the byte span of the trimmed
/// fragment inside the searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMatch {
    pub fragment: String,
    pub start: usize,
    pub end: usize,
}

/// First street-address-looking fragment in `text`, if any.
pub fn extract_address(text: &str) -> Option<AddressMatch> {
    let m = RE_ADDRESS.find(text)?;
    let raw = m.as_str();
    let lead = raw.len() - raw.trim_start().len();
    let fragment = raw.trim();
    if fragment.is_empty() {
        return None;
    }
    let start = m.start() + lead;
    Some(AddressMatch {
        fragment: fragment.to_string(),
        start,
        end: start + fragment.len(),
    })
}

/// Description with the leading address and known boilerplate removed.
pub fn summarize(description: &str, address: &str) -> String {
    let mut out = description.trim();

    if !address.is_empty() {
        let starts_with_addr = out
            .get(..address.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(address));
        if starts_with_addr {
            out = out[address.len()..].trim_start_matches([' ', ',', '.', '-']);
        }
    }

    let without_reported = RE_REPORTED_TO.replace_all(out, "");
    let trimmed = without_reported.trim();
    let without_occurred = RE_OCCURRED.replace_all(trimmed, "");
    without_occurred.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_table() {
        let cases: &[(&str, &str)] = &[
            (
                "7500 Block of 15th Ave NE Reported to UWPD: Theft occurred Monday 6/3/24 at 10:15 PM.",
                "7500 Block of 15th Ave NE",
            ),
            ("123 Fictional Way NE: suspicious person", "123 Fictional Way NE"),
            ("4500 block of University Way NE; vehicle prowl", "4500 block of University Way NE"),
            ("1400 NE Campus Pkwy. Fire alarm", "1400 NE Campus Pkwy."),
            ("456 Sample St, robbery", "456 Sample St"),
            ("Suspicious person near Red Square", ""),
            ("", ""),
        ];
        for (desc, expected) in cases {
            let got = extract_address(desc)
                .map(|m| m.fragment)
                .unwrap_or_default();
            assert_eq!(&got, expected, "description: {desc:?}");
        }
    }

    #[test]
    fn match_span_points_at_fragment() {
        let desc = "Near 4000 15th Ave NE, a bike was stolen";
        let m = extract_address(desc).unwrap();
        assert_eq!(&desc[m.start..m.end], m.fragment);
        assert_eq!(m.fragment, "4000 15th Ave NE");
    }

    #[test]
    fn summary_drops_leading_address_and_boilerplate() {
        let desc = "7500 Block of 15th Ave NE Reported to UWPD: Theft occurred Monday 6/3/24 at 10:15 PM. Suspect fled north.";
        let s = summarize(desc, "7500 Block of 15th Ave NE");
        assert_eq!(s, "Theft  Suspect fled north.");
        assert!(!s.contains("UWPD"));
        assert!(!s.contains("15th Ave"));
    }

    #[test]
    fn summary_leaves_text_without_matches_alone() {
        let desc = "Power outage affecting the west campus.";
        assert_eq!(summarize(desc, ""), desc);
    }

    #[test]
    fn address_not_at_start_is_kept_in_summary() {
        let desc = "Robbery near 4000 15th Ave NE.";
        assert_eq!(summarize(desc, "4000 15th Ave NE"), desc);
    }

    #[test]
    fn reported_to_other_authority_with_colon() {
        let desc = "Reported to Seattle Police: Assault on the Ave.";
        assert_eq!(summarize(desc, ""), "Assault on the Ave.");
    }
}
