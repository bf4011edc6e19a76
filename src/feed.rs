//! Minimal RSS 2.0 / Atom feed parsing.
//!
//! Covers the subset of both formats the blog and paper adapters need:
//! entry title, link, summary text, and publish date. Summaries are
//! HTML-stripped; entries missing a link or a parseable date are dropped by
//! the caller as validation failures.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One parsed feed entry.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// Parse an RSS 2.0 or Atom document into its entries.
///
/// RSS entries live in `<item>`, Atom entries in `<entry>`; both are
/// handled by tracking the element path and collecting the child fields
/// we care about.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "item" | "entry" => current = Some(FeedEntry::default()),
                    "title" if current.is_some() => field = Some(Field::Title),
                    "description" | "summary" | "content" if current.is_some() => {
                        field = Some(Field::Summary)
                    }
                    "pubdate" | "published" | "updated" | "date" if current.is_some() => {
                        field = Some(Field::Published)
                    }
                    "link" if current.is_some() => {
                        // Atom carries the URL in href; RSS as element text.
                        let href = e.attributes().flatten().find_map(|a| {
                            (local_name(a.key.as_ref()) == "href")
                                .then(|| String::from_utf8_lossy(&a.value).into_owned())
                        });
                        match href {
                            Some(href) => {
                                set_link(&mut current, &href);
                                field = None;
                            }
                            None => field = Some(Field::Link),
                        }
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "link" && current.is_some() {
                    if let Some(href) = e.attributes().flatten().find_map(|a| {
                        (local_name(a.key.as_ref()) == "href")
                            .then(|| String::from_utf8_lossy(&a.value).into_owned())
                    }) {
                        set_link(&mut current, &href);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().unwrap_or_default().into_owned();
                    apply_field(entry, f, &text);
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    apply_field(entry, f, &text);
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "item" || name == "entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("malformed feed XML"),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Summary,
    Published,
}

fn apply_field(entry: &mut FeedEntry, field: Field, text: &str) {
    match field {
        Field::Title => {
            if entry.title.is_empty() {
                entry.title = text.trim().to_string();
            }
        }
        Field::Link => {
            if entry.link.is_empty() {
                entry.link = text.trim().to_string();
            }
        }
        Field::Summary => {
            if entry.summary.is_empty() {
                entry.summary = strip_html(text).trim().to_string();
            }
        }
        Field::Published => {
            if entry.published.is_none() {
                entry.published = parse_feed_date(text.trim());
            }
        }
    }
}

fn set_link(current: &mut Option<FeedEntry>, href: &str) {
    if let Some(entry) = current.as_mut() {
        // Prefer the first alternate link; arXiv/Atom feeds may carry
        // several rel variants and the first is the canonical page.
        if entry.link.is_empty() {
            entry.link = href.trim().to_string();
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw).to_ascii_lowercase();
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Parse the date formats feeds actually use: RFC 2822 (RSS), RFC 3339
/// (Atom), and the date-only form some generators emit.
pub fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Remove HTML tags and collapse entities a summary commonly carries.
pub fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example Blog</title>
  <item>
    <title>Release 1.0</title>
    <link>https://example.com/release-1</link>
    <description>&lt;p&gt;Big &lt;b&gt;news&lt;/b&gt; today&lt;/p&gt;</description>
    <pubDate>Mon, 03 Mar 2025 12:00:00 GMT</pubDate>
  </item>
  <item>
    <title>No date entry</title>
    <link>https://example.com/no-date</link>
    <description>text</description>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <entry>
    <title>Atom Post</title>
    <link rel="alternate" href="https://example.com/atom-post"/>
    <summary>plain summary</summary>
    <published>2025-03-04T08:30:00Z</published>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let entries = parse_feed(RSS).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Release 1.0");
        assert_eq!(entries[0].link, "https://example.com/release-1");
        assert_eq!(entries[0].summary, "Big news today");
        assert!(entries[0].published.is_some());
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn test_parse_atom_entries() {
        let entries = parse_feed(ATOM).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://example.com/atom-post");
        assert_eq!(entries[0].summary, "plain summary");
        let published = entries[0].published.unwrap();
        assert_eq!(published.to_rfc3339(), "2025-03-04T08:30:00+00:00");
    }

    #[test]
    fn test_feed_title_not_mistaken_for_entry_title() {
        let entries = parse_feed(RSS).unwrap();
        assert!(entries.iter().all(|e| e.title != "Example Blog"));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>a <b>b</b> c</p>"), "a b c");
        assert_eq!(strip_html("no tags"), "no tags");
        assert_eq!(strip_html("&lt;kept&gt; &amp; more"), "<kept> & more");
    }

    #[test]
    fn test_parse_feed_date_variants() {
        assert!(parse_feed_date("Tue, 04 Mar 2025 08:30:00 +0000").is_some());
        assert!(parse_feed_date("2025-03-04T08:30:00Z").is_some());
        assert!(parse_feed_date("2025-03-04").is_some());
        assert!(parse_feed_date("yesterday").is_none());
    }

    #[test]
    fn test_mismatched_tags_are_an_error() {
        assert!(parse_feed("<rss><item></rss>").is_err());
    }
}
