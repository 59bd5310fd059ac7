//! Manual cookie input parsing.
//!
//! When automatic extraction fails the user can paste cookies copied from the
//! browser. Supported formats, tried in this order (first non-empty parse wins):
//! 1. JSON array of cookie objects (browser-extension exports)
//! 2. JSON object: a single cookie, or a `{ "cookies": [...] }` wrapper
//! 3. TAB-delimited lines: Netscape cookie file rows or `DevTools` table rows
//! 4. `name=value` lines (pairs on one line may also be `;`-separated)

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{CookieJar, SessionCredential};

/// Cookie payload format detected during capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedCookieFormat {
    /// JSON array of cookie objects.
    JsonArray,
    /// Single JSON object (or a wrapper holding a `cookies` array).
    JsonObject,
    /// TAB-separated rows (Netscape file or `DevTools` table copy).
    TabDelimited,
    /// `name=value` pairs.
    NameValue,
}

impl CapturedCookieFormat {
    /// Returns a stable label for logs and CLI output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonArray => "json-array",
            Self::JsonObject => "json-object",
            Self::TabDelimited => "tab-delimited",
            Self::NameValue => "name-value",
        }
    }
}

/// Parsed cookies captured from user input.
#[derive(Debug)]
pub struct CapturedCookies {
    /// Valid cookies, de-duplicated by name.
    pub cookies: CookieJar,
    /// Non-fatal warnings encountered while parsing.
    pub warnings: Vec<String>,
    /// Input format that was parsed.
    pub format: CapturedCookieFormat,
}

/// Errors that can occur while parsing manual cookie input.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Input was empty.
    #[error("cookie input is empty")]
    EmptyInput,
    /// No format yielded any valid cookie.
    #[error("no valid cookies found in input ({warnings} entries rejected)")]
    NoValidCookies {
        /// Number of rejected entries across all attempted formats.
        warnings: usize,
    },
}

/// Parses manual cookie input.
///
/// Cookies without a domain get `default_domain`; cookies without a path get `/`.
///
/// # Errors
///
/// Returns [`CaptureError::EmptyInput`] for blank input and
/// [`CaptureError::NoValidCookies`] when no format produced a cookie.
#[instrument(level = "debug", skip(input))]
pub fn parse_manual_cookie_input(
    input: &str,
    default_domain: &str,
) -> Result<CapturedCookies, CaptureError> {
    parse_manual_cookie_input_at(input, default_domain, unix_now())
}

pub(crate) fn parse_manual_cookie_input_at(
    input: &str,
    default_domain: &str,
    now: i64,
) -> Result<CapturedCookies, CaptureError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CaptureError::EmptyInput);
    }

    let mut rejected = 0;
    let parsers: [(CapturedCookieFormat, Parser); 4] = [
        (CapturedCookieFormat::JsonArray, parse_json_array),
        (CapturedCookieFormat::JsonObject, parse_json_object),
        (CapturedCookieFormat::TabDelimited, parse_tab_delimited),
        (CapturedCookieFormat::NameValue, parse_name_value_lines),
    ];

    for (format, parser) in parsers {
        let (cookies, warnings) = parser(trimmed, default_domain, now);
        if cookies.is_empty() {
            rejected += warnings.len();
            continue;
        }

        debug!(
            format = format.as_str(),
            cookies = cookies.len(),
            warnings = warnings.len(),
            "parsed manual cookie input"
        );
        return Ok(CapturedCookies {
            cookies: cookies.into_iter().collect(),
            warnings,
            format,
        });
    }

    Err(CaptureError::NoValidCookies { warnings: rejected })
}

type Parser = fn(&str, &str, i64) -> (Vec<SessionCredential>, Vec<String>);

fn parse_json_array(
    input: &str,
    default_domain: &str,
    now: i64,
) -> (Vec<SessionCredential>, Vec<String>) {
    if !input.starts_with('[') {
        return (Vec::new(), Vec::new());
    }
    match serde_json::from_str::<Vec<JsonCookieEntry>>(input) {
        Ok(entries) => convert_json_entries(entries, default_domain, now),
        Err(error) => (Vec::new(), vec![format!("invalid cookie JSON array: {error}")]),
    }
}

fn parse_json_object(
    input: &str,
    default_domain: &str,
    now: i64,
) -> (Vec<SessionCredential>, Vec<String>) {
    if !input.starts_with('{') {
        return (Vec::new(), Vec::new());
    }
    match serde_json::from_str::<JsonCookieObject>(input) {
        Ok(JsonCookieObject::Wrapped { cookies }) => {
            convert_json_entries(cookies, default_domain, now)
        }
        Ok(JsonCookieObject::Single(entry)) => {
            convert_json_entries(vec![entry], default_domain, now)
        }
        Err(error) => (Vec::new(), vec![format!("invalid cookie JSON object: {error}")]),
    }
}

fn convert_json_entries(
    entries: Vec<JsonCookieEntry>,
    default_domain: &str,
    now: i64,
) -> (Vec<SessionCredential>, Vec<String>) {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match convert_json_cookie(entry, default_domain, now) {
            Ok(cookie) => cookies.push(cookie),
            Err(reason) => warnings.push(format!("entry {}: {}", index + 1, reason)),
        }
    }

    (cookies, warnings)
}

fn convert_json_cookie(
    entry: JsonCookieEntry,
    default_domain: &str,
    now: i64,
) -> Result<SessionCredential, String> {
    let name = entry.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err("missing required field: name".to_string());
    }

    let value = match entry.value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(scalar @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
            scalar.to_string()
        }
        Some(_) => return Err(format!("cookie '{name}' value is not a scalar")),
    };
    if value.is_empty() {
        return Err(format!("cookie '{name}' has empty value"));
    }

    let mut domain = normalize_domain(entry.domain.or(entry.host).as_deref(), default_domain);
    if entry.host_only == Some(true) {
        domain = domain.trim_start_matches('.').to_string();
    }

    let max_age = entry
        .max_age
        .or_else(|| {
            entry
                .expiration_date
                .or(entry.expires)
                .and_then(|expiry| max_age_from_expiry(expiry, now))
        })
        .filter(|age| *age > 0);

    Ok(SessionCredential::new(name, value, domain)
        .with_path(normalize_path(entry.path.as_deref()))
        .with_max_age(max_age)
        .with_flags(
            entry.http_only.unwrap_or(false),
            entry.secure.unwrap_or(false),
        ))
}

fn parse_tab_delimited(
    input: &str,
    default_domain: &str,
    now: i64,
) -> (Vec<SessionCredential>, Vec<String>) {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (idx, raw_line) in input.lines().enumerate() {
        let line_number = idx + 1;
        // Handle CRLF: strip trailing \r
        let line = raw_line.trim_end();
        if line.is_empty() || line.starts_with('#') || !line.contains('\t') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        let parsed = if is_netscape_row(&fields) {
            parse_netscape_row(&fields, now)
        } else {
            parse_devtools_row(&fields, default_domain, now)
        };

        match parsed {
            Ok(cookie) => cookies.push(cookie),
            Err(reason) => warnings.push(format!("line {line_number}: {reason}")),
        }
    }

    (cookies, warnings)
}

/// Netscape rows carry exactly 7 fields with TRUE/FALSE in columns 2 and 4.
fn is_netscape_row(fields: &[&str]) -> bool {
    fields.len() == 7 && parse_bool_field(fields[1]).is_some() && parse_bool_field(fields[3]).is_some()
}

/// Parses `domain, tailmatch, path, secure, expires, name, value`.
fn parse_netscape_row(fields: &[&str], now: i64) -> Result<SessionCredential, String> {
    let domain = fields[0].trim();
    if domain.is_empty() {
        return Err("domain field is empty".to_string());
    }
    let name = fields[5].trim();
    if name.is_empty() {
        return Err("cookie name field is empty".to_string());
    }
    let value = fields[6];
    if value.is_empty() {
        return Err(format!("cookie '{name}' has empty value"));
    }

    let expires = fields[4].trim().parse::<i64>().map_err(|_| {
        format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        )
    })?;
    if expires > 0 && expires <= now {
        return Err(format!("cookie '{name}' has already expired"));
    }

    let tailmatch = parse_bool_field(fields[1]).unwrap_or(false);
    let domain = match (tailmatch, domain.starts_with('.')) {
        (true, false) => format!(".{domain}"),
        (false, true) => domain.trim_start_matches('.').to_string(),
        _ => domain.to_string(),
    };

    Ok(SessionCredential::new(name, value, domain)
        .with_path(normalize_path(Some(fields[2])))
        .with_max_age((expires > 0).then(|| expires - now))
        .with_flags(false, parse_bool_field(fields[3]).unwrap_or(false)))
}

/// Parses a row copied from the browser `DevTools` cookie table:
/// `name, value, domain, path, expires, size, httpOnly, secure, ...`.
///
/// Only name and value are required; flags are set when the column holds `✓`
/// or `true`.
fn parse_devtools_row(
    fields: &[&str],
    default_domain: &str,
    now: i64,
) -> Result<SessionCredential, String> {
    let name = fields[0].trim();
    if name.is_empty() {
        return Err("cookie name column is empty".to_string());
    }
    let value = fields.get(1).map_or("", |value| value.trim());
    if value.is_empty() {
        return Err(format!("cookie '{name}' has empty value"));
    }

    let column = |index: usize| fields.get(index).map(|field| field.trim());
    let max_age = column(4).and_then(|raw| parse_devtools_expiry(raw, now));

    Ok(SessionCredential::new(
        name,
        value,
        normalize_domain(column(2), default_domain),
    )
    .with_path(normalize_path(column(3)))
    .with_max_age(max_age)
    .with_flags(
        column(6).is_some_and(is_checked),
        column(7).is_some_and(is_checked),
    ))
}

fn parse_devtools_expiry(raw: &str, now: i64) -> Option<i64> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("session") {
        return None;
    }
    let expiry = DateTime::parse_from_rfc3339(raw).ok()?.timestamp();
    Some(expiry - now).filter(|age| *age > 0)
}

fn is_checked(raw: &str) -> bool {
    matches!(raw, "✓" | "true" | "TRUE" | "True")
}

fn parse_name_value_lines(
    input: &str,
    default_domain: &str,
    _now: i64,
) -> (Vec<SessionCredential>, Vec<String>) {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();

    for (idx, raw_line) in input.lines().enumerate() {
        let line_number = idx + 1;
        let line = raw_line.trim();
        let line = line
            .strip_prefix("Cookie:")
            .or_else(|| line.strip_prefix("cookie:"))
            .unwrap_or(line);

        for pair in line.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((name, value)) = pair.split_once('=') else {
                warnings.push(format!("line {line_number}: expected name=value"));
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                warnings.push(format!("line {line_number}: empty cookie name or value"));
                continue;
            }
            cookies.push(SessionCredential::new(name, value, default_domain));
        }
    }

    (cookies, warnings)
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

fn normalize_domain(raw: Option<&str>, default_domain: &str) -> String {
    let mut domain = raw.unwrap_or_default().trim();
    if let Some(stripped) = domain.strip_prefix("http://") {
        domain = stripped;
    } else if let Some(stripped) = domain.strip_prefix("https://") {
        domain = stripped;
    }
    if let Some((host, _rest)) = domain.split_once('/') {
        domain = host;
    }
    if domain.is_empty() {
        default_domain.to_string()
    } else {
        domain.to_string()
    }
}

fn normalize_path(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => "/".to_string(),
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("/{path}"),
    }
}

fn max_age_from_expiry(raw_expiry: f64, now: i64) -> Option<i64> {
    if !raw_expiry.is_finite() || raw_expiry <= 0.0 {
        return None;
    }
    // Saturating float-to-int cast; far-future expiries clamp to i64::MAX.
    #[allow(clippy::cast_possible_truncation)]
    let expiry = raw_expiry.floor() as i64;
    Some(expiry.saturating_sub(now))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
        })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCookieObject {
    Wrapped { cookies: Vec<JsonCookieEntry> },
    Single(JsonCookieEntry),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCookieEntry {
    name: Option<String>,
    /// Some exporters write numeric or boolean values unquoted.
    value: Option<serde_json::Value>,
    domain: Option<String>,
    host: Option<String>,
    host_only: Option<bool>,
    path: Option<String>,
    secure: Option<bool>,
    http_only: Option<bool>,
    expiration_date: Option<f64>,
    expires: Option<f64>,
    max_age: Option<i64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn parse(input: &str) -> Result<CapturedCookies, CaptureError> {
        parse_manual_cookie_input_at(input, "v0.dev", NOW)
    }

    #[test]
    fn test_name_value_lines_default_domain_and_path() {
        let parsed = parse("a=1\nb=2").unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::NameValue);
        assert_eq!(parsed.cookies.names(), vec!["a", "b"]);
        for cookie in parsed.cookies.iter() {
            assert_eq!(cookie.domain, "v0.dev");
            assert_eq!(cookie.path, "/");
        }
        assert_eq!(parsed.cookies.get("b").unwrap().value(), "2");
    }

    #[test]
    fn test_name_value_header_style_line() {
        let parsed = parse("Cookie: sid=abc; theme=dark").unwrap();
        assert_eq!(parsed.cookies.names(), vec!["sid", "theme"]);
    }

    #[test]
    fn test_name_value_keeps_equals_inside_value() {
        let parsed = parse("token=abc==").unwrap();
        assert_eq!(parsed.cookies.get("token").unwrap().value(), "abc==");
    }

    #[test]
    fn test_json_array_minimal_entry() {
        let parsed = parse(r#"[{"name":"x","value":"y"}]"#).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::JsonArray);
        assert_eq!(parsed.cookies.len(), 1);
        let cookie = parsed.cookies.get("x").unwrap();
        assert_eq!(cookie.value(), "y");
        assert_eq!(cookie.domain, "v0.dev");
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn test_json_array_accepts_unquoted_scalar_values() {
        let input = r#"[
            {"name":"uid","value":12345},
            {"name":"beta","value":true},
            {"name":"nested","value":{"a":1}},
            {"name":"__session","value":"s"}
        ]"#;
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::JsonArray);
        assert_eq!(parsed.cookies.names(), vec!["__session", "beta", "uid"]);
        assert_eq!(parsed.cookies.get("uid").unwrap().value(), "12345");
        assert_eq!(parsed.cookies.get("beta").unwrap().value(), "true");
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("nested"));
    }

    #[test]
    fn test_json_array_extension_export_fields() {
        let input = r#"
[
  {
    "domain": ".v0.dev",
    "name": "__Secure-next-auth.session-token",
    "value": "abc123",
    "path": "/",
    "secure": true,
    "httpOnly": true,
    "expirationDate": 1700003600.5
  }
]
"#;
        let parsed = parse(input).unwrap();
        let cookie = parsed
            .cookies
            .get("__Secure-next-auth.session-token")
            .unwrap();
        assert_eq!(cookie.domain, ".v0.dev");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.max_age_seconds, Some(3600));
    }

    #[test]
    fn test_json_array_invalid_entries_warn_and_keep_valid() {
        let input = r#"[{"name":"ok","value":"1"},{"name":"","value":"2"}]"#;
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.cookies.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_json_single_object() {
        let parsed = parse(r#"{"name":"sid","value":"v","domain":"https://v0.dev/chat"}"#).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::JsonObject);
        assert_eq!(parsed.cookies.get("sid").unwrap().domain, "v0.dev");
    }

    #[test]
    fn test_json_wrapped_object() {
        let input = r#"{"cookies":[{"name":"a","value":"1","hostOnly":true,"domain":".v0.dev"}]}"#;
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::JsonObject);
        assert_eq!(parsed.cookies.get("a").unwrap().domain, "v0.dev");
    }

    #[test]
    fn test_netscape_rows() {
        let input = "\
# Netscape HTTP Cookie File
.v0.dev\tTRUE\t/\tTRUE\t1700003600\tsession\tabc
v0.dev\tFALSE\t/\tFALSE\t0\ttheme\tdark
";
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::TabDelimited);
        let session = parsed.cookies.get("session").unwrap();
        assert_eq!(session.domain, ".v0.dev");
        assert!(session.secure);
        assert_eq!(session.max_age_seconds, Some(3600));
        assert_eq!(parsed.cookies.get("theme").unwrap().max_age_seconds, None);
    }

    #[test]
    fn test_netscape_expired_row_rejected() {
        let input = ".v0.dev\tTRUE\t/\tFALSE\t1\tsession\texpired";
        let result = parse(input);
        assert!(matches!(result, Err(CaptureError::NoValidCookies { .. })));
    }

    #[test]
    fn test_devtools_rows() {
        let input = "next-auth.session-token\teyJhbGci\tv0.dev\t/\t2023-11-15T00:13:20.000Z\t120\t✓\t✓\tLax\n\
                     theme\tdark\t\t\tSession\t9\t\t\t";
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::TabDelimited);
        let token = parsed.cookies.get("next-auth.session-token").unwrap();
        assert!(token.http_only);
        assert!(token.secure);
        assert_eq!(token.max_age_seconds, Some(1_700_007_200 - NOW));
        let theme = parsed.cookies.get("theme").unwrap();
        assert_eq!(theme.domain, "v0.dev");
        assert_eq!(theme.max_age_seconds, None);
    }

    #[test]
    fn test_json_takes_priority_over_name_value() {
        // Valid JSON containing '=' inside a value must not fall through to name=value.
        let parsed = parse(r#"[{"name":"a","value":"b=c"}]"#).unwrap();
        assert_eq!(parsed.format, CapturedCookieFormat::JsonArray);
        assert_eq!(parsed.cookies.get("a").unwrap().value(), "b=c");
    }

    #[test]
    fn test_unparsable_input_fails() {
        assert!(matches!(
            parse("???"),
            Err(CaptureError::NoValidCookies { .. })
        ));
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(parse("   \n"), Err(CaptureError::EmptyInput)));
    }
}
