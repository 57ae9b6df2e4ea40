//! Request descriptor parsing
//!
//! A raw request is a URL optionally followed by inline options:
//!
//! ```text
//! https://host/file.iso --header "Referer: https://host/" --dheader "Cookie" -- split 8
//! ```
//!
//! `--header` adds a request header, `--dheader` deletes one, and every standalone `--`
//! introduces a `key value` pair handed verbatim to the segmented engine. Parsing is
//! best-effort: malformed fragments are skipped and never fail the whole request.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::types::BackendKind;

/// Upper bound on `--` option pairs scanned from a single request
pub const MAX_OPTION_SCAN: usize = 100;

const HEADER_FLAG: &str = "--header";
const DELETE_HEADER_FLAG: &str = "--dheader";
const OPTION_FLAG: &str = "--";

/// Parsed, immutable form of a raw download request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    source: String,
    url: String,
    display_name: Option<String>,
    derived_file_name: String,
    headers: BTreeMap<String, String>,
    deleted_header_names: BTreeSet<String>,
    uri_options: BTreeMap<String, String>,
    save_path: Option<PathBuf>,
}

impl RequestDescriptor {
    /// Trimmed raw input the descriptor was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Download URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Name supplied alongside the request, if any
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// File name from the `out` option or the URL path
    pub fn derived_file_name(&self) -> &str {
        &self.derived_file_name
    }

    /// Name a task built from this descriptor should carry
    pub fn task_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.derived_file_name,
        }
    }

    /// Request headers that survived deletion
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Deleted header names, lower-cased
    pub fn deleted_header_names(&self) -> &BTreeSet<String> {
        &self.deleted_header_names
    }

    /// Whether `name` was deleted, compared case-insensitively
    pub fn is_header_deleted(&self, name: &str) -> bool {
        self.deleted_header_names
            .contains(&name.to_ascii_lowercase())
    }

    /// Engine options introduced by `--`
    pub fn uri_options(&self) -> &BTreeMap<String, String> {
        &self.uri_options
    }

    /// Save directory from the `dir` option
    pub fn save_path(&self) -> Option<&PathBuf> {
        self.save_path.as_ref()
    }

    /// Backend able to serve this URL
    ///
    /// `magnet:` links go to the swarm engine; everything else, including URLs the
    /// `url` crate cannot parse, goes to the segmented engine.
    pub fn backend_kind(&self) -> BackendKind {
        match url::Url::parse(&self.url) {
            Ok(parsed) if parsed.scheme().eq_ignore_ascii_case("magnet") => BackendKind::Swarm,
            _ => BackendKind::Segmented,
        }
    }
}

/// Parse a raw request without an explicit display name
pub fn parse(raw: &str) -> RequestDescriptor {
    parse_with_name(raw, None)
}

/// Parse a raw request
///
/// When `display_name` is non-empty the `out` option no longer names the file.
pub fn parse_with_name(raw: &str, display_name: Option<&str>) -> RequestDescriptor {
    let source = raw.trim().to_string();
    let display_name = display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let (url, options) = match source.find(char::is_whitespace) {
        Some(pos) => (source[..pos].to_string(), source[pos..].trim()),
        None => (source.clone(), ""),
    };

    let mut tokens = Tokens::new(options);
    let mut headers = parse_headers(&mut tokens);
    let deleted_header_names = parse_deleted_headers(&mut tokens);
    headers.retain(|key, _| !deleted_header_names.contains(&key.to_ascii_lowercase()));
    let uri_options = parse_uri_options(&mut tokens);

    let derived_file_name = match uri_options.get("out") {
        Some(out) if !out.is_empty() && display_name.is_none() => out.clone(),
        _ => file_name_from_url(&url),
    };
    let save_path = uri_options
        .get("dir")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);

    RequestDescriptor {
        source: source.clone(),
        url,
        display_name,
        derived_file_name,
        headers,
        deleted_header_names,
        uri_options,
        save_path,
    }
}

fn parse_headers(tokens: &mut Tokens<'_>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for flag in tokens.flag_positions(HEADER_FLAG) {
        let Some(value) = tokens.take_value(flag) else {
            continue;
        };
        if let Some((key, value)) = value.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                headers.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    headers
}

fn parse_deleted_headers(tokens: &mut Tokens<'_>) -> BTreeSet<String> {
    let mut deleted = BTreeSet::new();
    for flag in tokens.flag_positions(DELETE_HEADER_FLAG) {
        if let Some(value) = tokens.take_value(flag) {
            let name = value.trim();
            if !name.is_empty() {
                deleted.insert(name.to_ascii_lowercase());
            }
        }
    }
    deleted
}

fn parse_uri_options(tokens: &mut Tokens<'_>) -> BTreeMap<String, String> {
    let mut options = BTreeMap::new();
    let flags = tokens.flag_positions(OPTION_FLAG);
    for flag in flags.into_iter().take(MAX_OPTION_SCAN) {
        let Some(key) = tokens.take_value(flag) else {
            continue;
        };
        let key = key.trim().to_string();
        let value = tokens.take_value(flag + 1);
        let normalized = key.to_ascii_lowercase();
        if key.is_empty() || normalized == "header" || normalized == "dheader" {
            continue;
        }
        if let Some(value) = value {
            options.insert(key, value.to_string());
        }
    }
    options
}

/// Last path segment of `url`, cut at the query and the fragment
fn file_name_from_url(url: &str) -> String {
    let mut name = match url.rfind('/') {
        Some(pos) if pos > 0 => &url[pos + 1..],
        _ => url,
    };
    if let Some(pos) = name.find('?')
        && pos > 0
    {
        name = &name[..pos];
    }
    if let Some(pos) = name.find('#')
        && pos > 0
    {
        name = &name[..pos];
    }
    name.to_string()
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    quoted: bool,
    terminated: bool,
}

/// Option tokens with per-token consumption marks
///
/// A token is a `"`-quoted run (quotes excluded) or a run of non-whitespace. Each step
/// marks the tokens it uses so later steps never see them again.
struct Tokens<'a> {
    tokens: Vec<Token<'a>>,
    consumed: Vec<bool>,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut rest = input;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if let Some(inner) = rest.strip_prefix('"') {
                match inner.find('"') {
                    Some(end) => {
                        tokens.push(Token {
                            text: &inner[..end],
                            quoted: true,
                            terminated: true,
                        });
                        rest = &inner[end + 1..];
                    }
                    None => {
                        tokens.push(Token {
                            text: inner,
                            quoted: true,
                            terminated: false,
                        });
                        rest = "";
                    }
                }
            } else {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                tokens.push(Token {
                    text: &rest[..end],
                    quoted: false,
                    terminated: true,
                });
                rest = &rest[end..];
            }
        }
        let consumed = vec![false; tokens.len()];
        Self { tokens, consumed }
    }

    fn is_flag(token: &Token<'_>) -> bool {
        !token.quoted && token.text.starts_with(OPTION_FLAG)
    }

    /// Unconsumed positions holding exactly `flag`, each marked consumed
    fn flag_positions(&mut self, flag: &str) -> Vec<usize> {
        let mut positions = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if !self.consumed[i] && !token.quoted && token.text == flag {
                positions.push(i);
            }
        }
        for &i in &positions {
            self.consumed[i] = true;
        }
        positions
    }

    /// Take the token right after `pos` as a value
    ///
    /// Returns `None` when there is no such token, it was already used, it is another
    /// flag, or it is an unterminated quote. Unterminated quotes are still consumed.
    fn take_value(&mut self, pos: usize) -> Option<&'a str> {
        let next = pos + 1;
        let token = *self.tokens.get(next)?;
        if self.consumed[next] || Self::is_flag(&token) {
            return None;
        }
        self.consumed[next] = true;
        token.terminated.then_some(token.text)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_options() {
        let d = parse("  http://x/a/b.zip  ");
        assert_eq!(d.url(), "http://x/a/b.zip");
        assert_eq!(d.source(), "http://x/a/b.zip");
        assert_eq!(d.derived_file_name(), "b.zip");
        assert!(d.headers().is_empty());
        assert!(d.uri_options().is_empty());
    }

    #[test]
    fn deleted_header_cancels_added_header() {
        let d = parse(r#"http://x/a/b.zip --header "User-Agent: UA" --dheader "User-Agent""#);
        assert!(d.headers().is_empty(), "headers: {:?}", d.headers());
        assert!(d.is_header_deleted("user-agent"));
        assert_eq!(d.derived_file_name(), "b.zip");
    }

    #[test]
    fn deletion_is_case_insensitive() {
        let d = parse(
            r#"http://x/f --header "Cookie: a=1" --header "Referer: http://x/" --dheader COOKIE"#,
        );
        assert_eq!(d.headers().len(), 1);
        assert_eq!(d.headers().get("Referer").unwrap(), "http://x/");
    }

    #[test]
    fn query_and_fragment_are_stripped_from_file_name() {
        let d = parse("http://x/a/file?x=1#frag");
        assert_eq!(d.derived_file_name(), "file");
        let d = parse("http://x/a/file#frag");
        assert_eq!(d.derived_file_name(), "file");
    }

    #[test]
    fn leading_query_is_kept() {
        // '?' at index 0 of the last segment does not truncate
        let d = parse("http://x/?id=5");
        assert_eq!(d.derived_file_name(), "?id=5");
    }

    #[test]
    fn header_last_write_wins_and_values_are_trimmed() {
        let d = parse(r#"http://x/f --header "X-A:  one " --header X-A:two"#);
        assert_eq!(d.headers().get("X-A").unwrap(), "two");
    }

    #[test]
    fn header_value_keeps_later_colons() {
        let d = parse(r#"http://x/f --header "Referer: http://host:8080/path""#);
        assert_eq!(d.headers().get("Referer").unwrap(), "http://host:8080/path");
    }

    #[test]
    fn malformed_header_fragments_are_skipped() {
        let d = parse(r#"http://x/f --header novalue --header ":empty-key" --header "Ok: 1""#);
        assert_eq!(d.headers().len(), 1);
        assert_eq!(d.headers().get("Ok").unwrap(), "1");
    }

    #[test]
    fn uri_options_are_collected_and_unquoted() {
        let d = parse(r#"http://x/f.bin -- split 8 -- max-connection-per-server "4""#);
        assert_eq!(d.uri_options().get("split").unwrap(), "8");
        assert_eq!(d.uri_options().get("max-connection-per-server").unwrap(), "4");
    }

    #[test]
    fn header_keys_in_option_position_are_ignored() {
        let d = parse(r#"http://x/f -- header "A: b" -- DHeader x -- split 2"#);
        assert_eq!(d.uri_options().len(), 1);
        assert!(d.headers().is_empty());
    }

    #[test]
    fn header_values_are_not_rematched_as_options() {
        let d = parse(r#"http://x/f --header "X-Flag: --" -- split 3"#);
        assert_eq!(d.headers().get("X-Flag").unwrap(), "--");
        assert_eq!(d.uri_options().len(), 1);
        assert_eq!(d.uri_options().get("split").unwrap(), "3");
    }

    #[test]
    fn out_option_names_the_file() {
        let d = parse("http://x/download.php?id=1 -- out movie.mkv");
        assert_eq!(d.derived_file_name(), "movie.mkv");
        assert_eq!(d.task_name(), "movie.mkv");
    }

    #[test]
    fn explicit_name_disables_out() {
        let d = parse_with_name("http://x/a/setup.exe -- out other.exe", Some("Installer"));
        assert_eq!(d.derived_file_name(), "setup.exe");
        assert_eq!(d.task_name(), "Installer");
        assert_eq!(d.uri_options().get("out").unwrap(), "other.exe");
    }

    #[test]
    fn dir_option_sets_save_path() {
        let d = parse("http://x/f -- dir /data/incoming");
        assert_eq!(d.save_path().unwrap(), &PathBuf::from("/data/incoming"));
    }

    #[test]
    fn unterminated_quote_is_skipped() {
        let d = parse(r#"http://x/f -- split 2 --header "Broken: value"#);
        assert!(d.headers().is_empty());
        assert_eq!(d.uri_options().get("split").unwrap(), "2");
    }

    #[test]
    fn dangling_flags_do_not_panic() {
        let d = parse("http://x/f --header");
        assert!(d.headers().is_empty());
        let d = parse("http://x/f -- key");
        assert!(d.uri_options().is_empty());
        let d = parse("http://x/f -- -- --");
        assert!(d.uri_options().is_empty());
    }

    #[test]
    fn option_scan_is_capped() {
        let mut raw = String::from("http://x/f");
        for i in 0..(MAX_OPTION_SCAN + 50) {
            raw.push_str(&format!(" -- k{i} v"));
        }
        let d = parse(&raw);
        assert_eq!(d.uri_options().len(), MAX_OPTION_SCAN);
        assert!(d.uri_options().contains_key("k0"));
        assert!(!d.uri_options().contains_key(&format!("k{}", MAX_OPTION_SCAN)));
    }

    #[test]
    fn adversarial_repeated_separators_terminate() {
        let raw = format!("http://x/f {}", "-- ".repeat(10_000));
        let d = parse(&raw);
        assert!(d.uri_options().is_empty());
    }

    #[test]
    fn backend_kind_follows_scheme() {
        assert_eq!(
            parse("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567").backend_kind(),
            BackendKind::Swarm
        );
        assert_eq!(parse("https://x/f").backend_kind(), BackendKind::Segmented);
        assert_eq!(parse("ftp://x/f").backend_kind(), BackendKind::Segmented);
        assert_eq!(parse("not a url").backend_kind(), BackendKind::Segmented);
    }
}
