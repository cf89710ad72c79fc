// src/ingest/parser.rs
//! Atom / RSS 2.0 / RSS 1.0 (RDF) payload → newest-first `StatusEvent`s.
//!
//! Parsing is a pure function of the payload: no dedup, no clock reads.
//! Entries without a usable date get the Unix epoch so they sort last and
//! their fallback id stays stable across polls.

use chrono::{DateTime, Utc};
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::Deserialize;

use crate::error::MonitorError;
use crate::ingest::normalize_text;
use crate::ingest::types::StatusEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Atom,
    Rss,
    /// RSS 1.0: `<rdf:RDF>` root, items are siblings of `<channel>`.
    Rdf,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<TextNode>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

// ---- RSS ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    guid: Option<TextNode>,
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// ---- RSS 1.0 ----

#[derive(Debug, Deserialize)]
struct RdfFeed {
    #[serde(rename = "item", default)]
    items: Vec<RdfItem>,
}

#[derive(Debug, Deserialize)]
struct RdfItem {
    #[serde(rename = "@about", alias = "@rdf:about")]
    about: Option<String>,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "date", alias = "dc:date")]
    date: Option<String>,
}

/// Element whose attributes we ignore (`type="html"`, `isPermaLink`, ...).
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Format-independent view of one entry before normalization.
struct RawEntry {
    id: Option<String>,
    link: Option<String>,
    title: String,
    date: Option<String>,
    summary: String,
}

/// Parse a feed payload into events sorted newest first (ties keep document
/// order).
pub fn parse_feed(provider_id: &str, payload: &str) -> Result<Vec<StatusEvent>, MonitorError> {
    let t0 = std::time::Instant::now();
    let xml = scrub_html_entities_for_xml(payload.trim_start_matches('\u{feff}'));
    let xml = inline_xhtml_constructs(&xml);

    let raw = match detect_format(provider_id, &xml)? {
        FeedFormat::Atom => atom_entries(provider_id, &xml)?,
        FeedFormat::Rss => rss_items(provider_id, &xml)?,
        FeedFormat::Rdf => rdf_items(provider_id, &xml)?,
    };

    let mut out: Vec<StatusEvent> = raw
        .into_iter()
        .map(|entry| to_event(provider_id, entry))
        .collect();
    // sort_by is stable
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    histogram!("status_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

/// Look at the first element to decide between Atom, RSS and RDF.
pub fn detect_format(provider_id: &str, xml: &str) -> Result<FeedFormat, MonitorError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"feed" => Ok(FeedFormat::Atom),
                    b"rss" => Ok(FeedFormat::Rss),
                    b"RDF" => Ok(FeedFormat::Rdf),
                    other => Err(MonitorError::parse(
                        provider_id,
                        format!(
                            "unsupported root element <{}>",
                            String::from_utf8_lossy(other)
                        ),
                    )),
                };
            }
            Ok(Event::Eof) => {
                return Err(MonitorError::parse(provider_id, "payload has no root element"))
            }
            Ok(_) => continue,
            Err(e) => return Err(MonitorError::parse(provider_id, e.to_string())),
        }
    }
}

fn atom_entries(provider_id: &str, xml: &str) -> Result<Vec<RawEntry>, MonitorError> {
    let feed: AtomFeed = from_str(xml)
        .map_err(|e| MonitorError::parse(provider_id, format!("atom: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .map(|e| {
            let link = e
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| e.links.first())
                .and_then(|l| l.href.clone());
            RawEntry {
                id: e.id,
                link,
                title: e.title.map(|t| t.value).unwrap_or_default(),
                date: e.published.or(e.updated),
                summary: e
                    .summary
                    .or(e.content)
                    .map(|t| t.value)
                    .unwrap_or_default(),
            }
        })
        .collect())
}

fn rss_items(provider_id: &str, xml: &str) -> Result<Vec<RawEntry>, MonitorError> {
    let rss: Rss =
        from_str(xml).map_err(|e| MonitorError::parse(provider_id, format!("rss: {e}")))?;

    Ok(rss
        .channel
        .items
        .into_iter()
        .map(|it| RawEntry {
            id: it.guid.map(|g| g.value),
            link: it.link,
            title: it.title.unwrap_or_default(),
            date: it.pub_date,
            summary: it.description.unwrap_or_default(),
        })
        .collect())
}

fn rdf_items(provider_id: &str, xml: &str) -> Result<Vec<RawEntry>, MonitorError> {
    let rdf: RdfFeed =
        from_str(xml).map_err(|e| MonitorError::parse(provider_id, format!("rdf: {e}")))?;

    Ok(rdf
        .items
        .into_iter()
        .map(|it| RawEntry {
            id: it.about,
            link: it.link,
            title: it.title.unwrap_or_default(),
            date: it.date,
            summary: it.description.unwrap_or_default(),
        })
        .collect())
}

fn to_event(provider_id: &str, entry: RawEntry) -> StatusEvent {
    let timestamp = entry
        .date
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let title = normalize_text(&entry.title);
    let link = non_blank(entry.link);

    let entry_id = non_blank(entry.id)
        .or_else(|| link.clone())
        .unwrap_or_else(|| content_hash(&title, &timestamp));

    let mut product = extract_components(&entry.summary);
    if product.is_empty() {
        let fallback = if title.is_empty() {
            provider_id.to_string()
        } else {
            title.clone()
        };
        product.push(fallback);
    }

    let mut status_message = extract_status_message(&entry.summary);
    if status_message.is_empty() {
        status_message = if title.is_empty() {
            product.join(", ")
        } else {
            title
        };
    }

    StatusEvent {
        provider_id: provider_id.to_string(),
        entry_id,
        timestamp,
        product,
        status_message,
        link,
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// RFC 3339 (Atom) or RFC 2822 (RSS); some RSS feeds use RFC 3339 too.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_rfc2822(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Stable id for entries that carry neither id/guid nor link.
fn content_hash(title: &str, timestamp: &DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(timestamp.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(7 + 32);
    out.push_str("sha256:");
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn re_component() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<li[^>]*>\s*(.*?)\s*\(").unwrap())
}

fn re_component_item() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<li[^>]*>[^<]*\([^<]*\)\s*</li>").unwrap())
}

fn re_affected() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)affected components").unwrap())
}

fn re_all_impacted() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)all impacted services").unwrap())
}

fn re_status_label() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bstatus:\s*").unwrap())
}

/// Component names listed as `<li>Name (state)</li>` in the summary HTML.
pub fn extract_components(summary_html: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in re_component().captures_iter(summary_html) {
        let name = normalize_text(&caps[1]);
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Status text from the summary: before the component list, without the
/// `Status:` label and the recovery boilerplate.
pub fn extract_status_message(summary_html: &str) -> String {
    // Component items belong to `product`, heading or not
    let without_components = re_component_item().replace_all(summary_html, " ");
    let text = normalize_text(&without_components);
    let head = re_affected().split(&text).next().unwrap_or_default();
    let head = re_all_impacted().split(head).next().unwrap_or_default();
    let head = re_status_label().replace_all(head, "");
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn re_named_entity() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]{1,31});").unwrap())
}

fn re_xhtml_open() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<(title|summary|content)\b([^>]*\btype\s*=\s*["']xhtml["'][^>]*)>"#)
            .unwrap()
    })
}

/// XML knows five named entities; feeds carry the whole HTML set. Known
/// HTML names become numeric references, unknown ones literal text.
fn scrub_html_entities_for_xml(s: &str) -> String {
    let s = s
        .replace("&nbsp;", "&#160;")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...");

    re_named_entity()
        .replace_all(&s, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if matches!(name, "amp" | "lt" | "gt" | "quot" | "apos") {
                return caps[0].to_string();
            }
            let decoded = html_escape::decode_html_entities(&caps[0]);
            if *decoded == caps[0] {
                format!("&amp;{name};")
            } else {
                decoded.chars().map(|c| format!("&#x{:x};", c as u32)).collect()
            }
        })
        .into_owned()
}

/// Atom `type="xhtml"` text constructs hold markup, not text. Escape their
/// body so it deserializes as a plain string; `normalize_text` strips the
/// tags later.
fn inline_xhtml_constructs(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(caps) = re_xhtml_open().captures(rest) {
        let (Some(open), Some(tag), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            break;
        };
        out.push_str(&rest[..open.end()]);
        rest = &rest[open.end()..];
        if attrs.as_str().trim_end().ends_with('/') {
            continue;
        }
        let close = format!("</{}>", tag.as_str());
        let Some(body_len) = rest.find(&close) else {
            break;
        };
        out.push_str(&html_escape::encode_text(&rest[..body_len]));
        rest = &rest[body_len..];
    }
    out.push_str(rest);
    out
}
