//! Deep-link parser for lasoprinter activations.
//! lasoprinter 深層連結解析器。
//!
//! A link looks like `lasoprinter://print?url=<refs>&printer=<name>` where `<refs>` is a
//! comma-separated list of percent-encoded image references. The query value is decoded
//! once by the query parser and each segment is decoded again, so a reference that
//! itself contains a comma has to be double-encoded (`%252C`). [`build_link`] takes care
//! of that. A segment that is not valid UTF-8 once decoded is set aside in
//! [`DeepLink::undecodable`] and never costs its siblings their print.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Scheme registered with the operating system.
/// 向作業系統註冊的 URL scheme。
pub const DEFAULT_SCHEME: &str = "lasoprinter";

const IMAGES_PARAM: &str = "url";
const PRINTER_PARAM: &str = "printer";
const REFERENCE_SEPARATOR: char = ',';

/// Action named by the link host (`lasoprinter://<action>`).
/// 連結主機部分所指定的動作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    Print,
    Unknown(String),
}

impl LinkAction {
    fn route(host: &str) -> Self {
        if host.is_empty() || host.eq_ignore_ascii_case("print") {
            LinkAction::Print
        } else {
            LinkAction::Unknown(host.to_string())
        }
    }
}

impl fmt::Display for LinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkAction::Print => f.write_str("print"),
            LinkAction::Unknown(name) => write!(f, "{name} (unknown)"),
        }
    }
}

/// Parsed deep-link invocation.
/// 解析完成的深層連結。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink {
    pub scheme: String,
    pub action: LinkAction,
    pub images: Vec<String>,
    /// Raw segments that did not decode to UTF-8, in link order.
    pub undecodable: Vec<String>,
    pub printer: Option<String>,
}

impl DeepLink {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// Errors emitted while parsing a deep link.
/// 解析深層連結時可能回傳的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("invalid link '{link}': {reason}")]
    InvalidUrl { link: String, reason: String },
    #[error("unexpected scheme '{found}' (expected '{expected}')")]
    SchemeMismatch { expected: String, found: String },
}

/// Parses `link` into a [`DeepLink`], requiring the given scheme.
/// 解析連結並確認 scheme 相符。
pub fn parse_link(link: &str, expected_scheme: &str) -> Result<DeepLink, LinkError> {
    let url = Url::parse(link.trim()).map_err(|err| LinkError::InvalidUrl {
        link: link.to_string(),
        reason: err.to_string(),
    })?;

    if !url.scheme().eq_ignore_ascii_case(expected_scheme) {
        return Err(LinkError::SchemeMismatch {
            expected: expected_scheme.to_string(),
            found: url.scheme().to_string(),
        });
    }

    let action = LinkAction::route(url.host_str().unwrap_or_default());

    // Later duplicates win.
    let mut raw_images = None;
    let mut printer = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            IMAGES_PARAM => raw_images = Some(value.into_owned()),
            PRINTER_PARAM => {
                let trimmed = value.trim();
                printer = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
            _ => {}
        }
    }

    let (images, undecodable) = split_references(raw_images.as_deref().unwrap_or_default());

    Ok(DeepLink {
        scheme: url.scheme().to_ascii_lowercase(),
        action,
        images,
        undecodable,
        printer,
    })
}

fn split_references(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut images = Vec::new();
    let mut undecodable = Vec::new();
    for segment in raw.split(REFERENCE_SEPARATOR) {
        if segment.trim().is_empty() {
            continue;
        }
        match urlencoding::decode(segment) {
            Ok(decoded) => images.push(decoded.into_owned()),
            Err(_) => undecodable.push(segment.to_string()),
        }
    }
    (images, undecodable)
}

/// Builds a link that [`parse_link`] turns back into exactly `references`.
/// 建立可由 [`parse_link`] 還原的連結。
pub fn build_link<S>(
    scheme: &str,
    action: &str,
    references: &[S],
    printer: Option<&str>,
) -> Result<String, LinkError>
where
    S: AsRef<str>,
{
    let base = format!("{scheme}://{action}");
    let mut url = Url::parse(&base).map_err(|err| LinkError::InvalidUrl {
        link: base.clone(),
        reason: err.to_string(),
    })?;

    let joined = references
        .iter()
        .map(|reference| urlencoding::encode(reference.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair(IMAGES_PARAM, &joined);
        if let Some(printer) = printer {
            pairs.append_pair(PRINTER_PARAM, printer);
        }
    }
    Ok(url.into())
}

/// Returns the trailing argument when it is a link of `scheme`.
/// 若最後一個參數為指定 scheme 的連結則回傳之。
pub fn link_from_argv<S>(argv: &[S], scheme: &str) -> Option<String>
where
    S: AsRef<str>,
{
    let last = argv.last()?.as_ref().trim();
    let (found, _) = last.split_once(':')?;
    found
        .eq_ignore_ascii_case(scheme)
        .then(|| last.to_string())
}
