//! Decide what an inbound drop means: open a link, save a file, or nothing usable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Upload names whose content is expected to be nothing but a link.
const URL_WRAPPER_EXTS: &[&str] = &[".txt", ".url", ".webloc"];
const HTML_EXTS: &[&str] = &[".html", ".htm"];

pub const UNTITLED: &str = "untitled";

static META_REFRESH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)http-equiv=["']refresh["'].*?url=([^"'> ]+)"#)
        .expect("meta refresh pattern must compile")
});

static WEBLOC_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<key>\s*URL\s*</key>\s*<string>\s*([^<]+?)\s*</string>")
        .expect("webloc pattern must compile")
});

static SHORTCUT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*URL\s*=\s*(\S+)\s*$").expect("internet shortcut pattern must compile")
});

static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a[^>]+href=["']([^"']+)["']"#).expect("anchor pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundPayload {
    pub text: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoContent,
    TextNotALink,
}

impl RejectReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::NoContent => "No content provided",
            Self::TextNotALink => "Text is not an http(s) link and no file was provided",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedAction {
    OpenUrl(String),
    SaveFile { suggested_name: String, bytes: Vec<u8> },
    Reject(RejectReason),
}

/// Return the trimmed input if it is a single-token http(s) URL with a host.
pub fn http_url(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.chars().any(char::is_whitespace) {
        return None;
    }
    let lower = s.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return None;
    }
    let parsed = url::Url::parse(s).ok()?;
    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    (matches!(parsed.scheme(), "http" | "https") && has_host).then(|| s.to_string())
}

/// Pull a destination out of a share-sheet style HTML page.
///
/// A meta refresh target wins over anchors; only the first anchor is considered.
pub fn url_from_html(html: &str) -> Option<String> {
    let from_meta = META_REFRESH
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| http_url(m.as_str()));
    from_meta.or_else(|| {
        ANCHOR_HREF
            .captures(html)
            .and_then(|c| c.get(1))
            .and_then(|m| http_url(m.as_str()))
    })
}

fn ends_with_any(name: &str, exts: &[&str]) -> bool {
    let lower = name.to_lowercase();
    exts.iter().any(|e| lower.ends_with(e))
}

/// Last path component of an uploaded name; never empty, never a dot entry.
pub fn base_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." {
        UNTITLED.to_string()
    } else {
        base
    }
}

/// Link stored in a URL wrapper file. The bare URL always counts; `.webloc`
/// (Safari plist) and `.url` (Windows shortcut) may also use their structured form.
pub fn url_from_wrapper(filename: &str, text: &str) -> Option<String> {
    if let Some(url) = http_url(text) {
        return Some(url);
    }
    let structured = if ends_with_any(filename, &[".webloc"]) {
        &*WEBLOC_URL
    } else if ends_with_any(filename, &[".url"]) {
        &*SHORTCUT_URL
    } else {
        return None;
    };
    structured
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| http_url(m.as_str()))
}

/// Link carried inside an uploaded file, if its type is one we unwrap.
pub fn url_from_file(file: &FileUpload) -> Option<String> {
    let text = || String::from_utf8_lossy(&file.bytes);
    if ends_with_any(&file.filename, URL_WRAPPER_EXTS) {
        return url_from_wrapper(&file.filename, &text());
    }
    if ends_with_any(&file.filename, HTML_EXTS) {
        return url_from_html(&text());
    }
    None
}

pub fn classify(payload: InboundPayload) -> ClassifiedAction {
    let InboundPayload { text, file } = payload;
    let text = text.filter(|t| !t.is_empty());

    if let Some(url) = text.as_deref().and_then(http_url) {
        return ClassifiedAction::OpenUrl(url);
    }

    match file {
        Some(file) => match url_from_file(&file) {
            Some(url) => ClassifiedAction::OpenUrl(url),
            None => ClassifiedAction::SaveFile {
                suggested_name: base_filename(&file.filename),
                bytes: file.bytes,
            },
        },
        None if text.is_some() => ClassifiedAction::Reject(RejectReason::TextNotALink),
        None => ClassifiedAction::Reject(RejectReason::NoContent),
    }
}
