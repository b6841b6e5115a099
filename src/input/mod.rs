//! Where a package comes from: a local file, or the Chrome Web Store.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

// Chrome ids use the 16-letter alphabet a..=p
static CHROME_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-p]{32}$").unwrap());
static CHROME_ID_IN_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/([a-p]{32})(?:[/?#]|$)").unwrap());

const STORE_HOSTS: [&str; 2] = ["chromewebstore.google.com", "chrome.google.com/webstore"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Empty input")]
    Empty,

    #[error("No extension id in Web Store URL: {0}")]
    NoExtensionId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Package to fetch from the Web Store by id.
    WebStore(String),
    LocalFile(PathBuf),
}

impl InputSource {
    /// Short label for log lines and error context.
    pub fn describe(&self) -> String {
        match self {
            InputSource::WebStore(id) => format!("Web Store extension {}", id),
            InputSource::LocalFile(path) => path.display().to_string(),
        }
    }
}

/// Classify a command-line argument.
///
/// Store URLs and bare ids resolve to [`InputSource::WebStore`]; everything
/// else is treated as a path, whether or not it exists yet.
pub fn parse_input(input: &str) -> Result<InputSource, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }

    let lower = input.to_lowercase();
    if lower.ends_with(".crx") || lower.ends_with(".zip") {
        return Ok(InputSource::LocalFile(PathBuf::from(input)));
    }

    if STORE_HOSTS.iter().any(|host| lower.contains(host)) {
        return extension_id_from_url(input)
            .map(InputSource::WebStore)
            .ok_or_else(|| InputError::NoExtensionId(input.to_string()));
    }

    if CHROME_ID_RE.is_match(input) {
        return Ok(InputSource::WebStore(input.to_string()));
    }

    Ok(InputSource::LocalFile(PathBuf::from(input)))
}

/// The id path segment of a Web Store detail URL.
pub fn extension_id_from_url(url: &str) -> Option<String> {
    CHROME_ID_IN_URL_RE
        .captures(url)
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_detail_url() {
        let url = "https://chromewebstore.google.com/detail/metamask/nkbihfbeogaeaoehlefnkodbefgpgknn";
        assert_eq!(
            extension_id_from_url(url),
            Some("nkbihfbeogaeaoehlefnkodbefgpgknn".to_string())
        );
    }

    #[test]
    fn test_id_followed_by_query() {
        let url = "https://chromewebstore.google.com/detail/nkbihfbeogaeaoehlefnkodbefgpgknn?hl=en";
        assert_eq!(
            extension_id_from_url(url),
            Some("nkbihfbeogaeaoehlefnkodbefgpgknn".to_string())
        );
    }

    #[test]
    fn test_url_without_id() {
        let url = "https://chromewebstore.google.com/detail/some-extension-name-that-is-long/zzzz";
        assert_eq!(
            parse_input(url),
            Err(InputError::NoExtensionId(url.to_string()))
        );
    }

    #[test]
    fn test_uppercase_store_host() {
        let url = "HTTPS://CHROMEWEBSTORE.GOOGLE.COM/detail/extension/nkbihfbeogaeaoehlefnkodbefgpgknn";
        assert_eq!(
            parse_input(url),
            Ok(InputSource::WebStore("nkbihfbeogaeaoehlefnkodbefgpgknn".to_string()))
        );
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(parse_input("   "), Err(InputError::Empty));
    }
}
