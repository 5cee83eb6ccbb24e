//! Text cleanup applied to listing cells before they become records.

const QUOTES: &[char] = &[
    '"', '\'', '´', '`', '′', '″', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '\u{00AB}',
    '\u{00BB}', '\u{201E}', '\u{201A}', '\u{2039}', '\u{203A}',
];

const RESOLUTION_RTYPE: i64 = 15;
const DECREE_RTYPE: i64 = 14;
pub const DEFAULT_RTYPE: i64 = 14;

/// Drop every ASCII and typographic quote, then collapse whitespace.
pub fn strip_quotes(text: &str) -> String {
    let unquoted: String = text.chars().filter(|c| !QUOTES.contains(c)).collect();
    unquoted.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First character upper-cased, the rest lower-cased.
pub fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Regulation type from keywords in the title.
pub fn rtype_for_title(title: &str) -> i64 {
    let lower = title.to_lowercase();
    if lower.contains("resolución") || lower.contains("resolucion") {
        RESOLUTION_RTYPE
    } else if lower.contains("decreto") {
        DECREE_RTYPE
    } else {
        DEFAULT_RTYPE
    }
}

/// Listing dates come as ISO timestamps, `DD/MM/YYYY`, or already as `YYYY-MM-DD`.
pub fn normalize_listing_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Some((date, _)) = raw.split_once('T') {
        return date.to_string();
    }
    if raw.contains('/') {
        if let [day, month, year] = raw.split('/').collect::<Vec<_>>()[..] {
            return format!("{}-{:0>2}-{:0>2}", year, month, day);
        }
    }
    raw.to_string()
}

/// Turn a site-relative href into an absolute URL.
pub fn absolute_link(href: &str, site_root: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", site_root.trim_end_matches('/'), href)
    }
}
