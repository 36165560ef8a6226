// src/ingest/feed.rs
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::incident::Incident;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("feed is not a parseable RSS document: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// Parses an RSS document into candidate incidents, one per `channel/item`,
/// in document order.
pub fn parse_feed(body: &[u8]) -> Result<Vec<Incident>, FeedError> {
    let t0 = std::time::Instant::now();
    let text = std::str::from_utf8(body)?;
    let xml_clean = scrub_html_entities_for_xml(text);
    let rss: Rss = from_str(&xml_clean)?;

    let out: Vec<Incident> = rss
        .channel
        .item
        .into_iter()
        .map(|it| {
            super::build_incident(
                field(it.title),
                field(it.link),
                field(it.pub_date),
                field(it.description),
            )
        })
        .collect();

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_items_total").increment(out.len() as u64);
    Ok(out)
}

/// Trimmed text with HTML entities decoded; CDATA sections keep them literal.
fn field(v: Option<String>) -> String {
    v.map(|s| html_escape::decode_html_entities(s.trim()).trim().to_string())
        .unwrap_or_default()
}

/// WordPress feeds leak HTML named entities that XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>UW Alerts</title>
    <link>https://emergency.uw.edu</link>
    <item>
      <title>Theft near campus</title>
      <link>https://emergency.uw.edu/2024/06/03/theft/</link>
      <pubDate>Mon, 03 Jun 2024 22:40:00 +0000</pubDate>
      <description><![CDATA[7500 Block of 15th Ave NE Reported to UWPD: Theft occurred Monday 6/3/24 at 10:15 PM.]]></description>
    </item>
    <item>
      <title>Power&nbsp;outage</title>
      <link>https://emergency.uw.edu/2024/06/04/outage/</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_in_order_with_defaults() {
        let items = parse_feed(TWO_ITEMS.as_bytes()).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Theft near campus");
        assert_eq!(first.source_url, "https://emergency.uw.edu/2024/06/03/theft/");
        assert_eq!(first.post_date, "Mon, 03 Jun 2024 22:40:00 +0000");
        assert_eq!(first.address_string, "7500 Block of 15th Ave NE");
        assert_eq!(first.summary_text, "Theft");
        assert!(first.id.is_empty() && first.incident_time_approx.is_empty());
        assert!(first.latitude.is_empty() && first.longitude.is_empty());

        let second = &items[1];
        assert_eq!(second.title, "Power outage");
        assert_eq!(second.post_date, "");
        assert_eq!(second.address_string, "");
        assert_eq!(second.summary_text, "");
    }

    #[test]
    fn entities_inside_cdata_are_decoded() {
        let xml = r#"<rss><channel><item>
            <title><![CDATA[Smash &amp; grab]]></title>
            <description><![CDATA[4100 Roosevelt Way NE &#8211; window broken]]></description>
        </item></channel></rss>"#;
        let items = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(items[0].title, "Smash & grab");
        assert_eq!(items[0].address_string, "4100 Roosevelt Way NE");
        assert_eq!(items[0].summary_text, "\u{2013} window broken");
    }

    #[test]
    fn channel_without_items_is_empty_not_an_error() {
        let xml = r#"<rss><channel><title>quiet</title></channel></rss>"#;
        assert!(parse_feed(xml.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(matches!(
            parse_feed(b"<rss><channel><item><title>x</title>"),
            Err(FeedError::Xml(_))
        ));
        assert!(matches!(
            parse_feed(b"<html><body>blocked</body></html>"),
            Err(FeedError::Xml(_))
        ));
        assert!(matches!(
            parse_feed(&[0xff, 0xfe, 0x00]),
            Err(FeedError::Encoding(_))
        ));
    }
}
