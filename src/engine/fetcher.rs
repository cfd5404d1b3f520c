use super::traits::ListFetcher;
use super::types::DomainSet;
use crate::config::FetchConfig;
use crate::error::FetchError;
use futures::StreamExt;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

// Dot-separated labels of [a-z0-9-], no leading/trailing hyphen, at least one dot.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("domain pattern is valid")
});

/// Lowercases and trims a domain, dropping a trailing root dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_lowercase()
}

/// Checks a lowercase candidate against the domain syntax rule.
pub fn is_valid_domain(candidate: &str) -> bool {
    DOMAIN_RE.is_match(candidate)
}

/// Turns one raw list line into a domain, or `None` for comments, blanks and
/// anything that is not a well-formed domain.
pub fn parse_line(line: &str) -> Option<String> {
    let line = line.trim().to_lowercase();
    if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
        return None;
    }
    if !is_valid_domain(&line) {
        return None;
    }
    Some(line)
}

pub fn parse_list(text: &str) -> DomainSet {
    text.lines().filter_map(parse_line).collect()
}

/// Fetches lists over HTTP(S) with short timeouts.
pub struct HttpListFetcher {
    client: Client,
}

impl HttpListFetcher {
    pub fn new(config: &FetchConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ListFetcher for HttpListFetcher {
    async fn fetch(&self, url: &str) -> Result<DomainSet, FetchError> {
        info!("Fetching domain list from {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let stream = Box::pin(
            resp.bytes_stream()
                .map(|result| result.map_err(std::io::Error::other)),
        );
        let reader = StreamReader::new(stream);
        // Split on raw bytes: the body is untrusted and may not be valid UTF-8.
        let mut lines = BufReader::new(reader).split(b'\n');
        let mut domains = DomainSet::default();
        let mut skipped = 0usize;

        while let Some(raw) = lines
            .next_segment()
            .await
            .map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })?
        {
            match std::str::from_utf8(&raw).ok().and_then(parse_line) {
                Some(domain) => {
                    domains.insert(domain);
                }
                None => skipped += 1,
            }
        }

        debug!("Skipped {} non-domain lines from {}", skipped, url);
        info!("Parsed {} valid domains from {}", domains.len(), url);
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_simple_format() {
        let content = "
        # Check comments
        // and the other comment style
        Example.com
        adserver.net
        # Empty line

        justadomain.co.uk\r
        adserver.net
        ";

        let domains = parse_list(content);
        assert_eq!(domains.len(), 3);
        assert!(domains.contains("example.com"));
        assert!(domains.contains("adserver.net"));
        assert!(domains.contains("justadomain.co.uk"));
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert_eq!(parse_line("localhost"), None);
        assert_eq!(parse_line("-bad.com"), None);
        assert_eq!(parse_line("bad-.com"), None);
        assert_eq!(parse_line("two..dots.com"), None);
        assert_eq!(parse_line("has space.com"), None);
        assert_eq!(parse_line("0.0.0.0 ads.example.com"), None);
        assert_eq!(parse_line("*.wild.com"), None);
        assert_eq!(parse_line("  MiXeD-Case.Org  "), Some("mixed-case.org".to_string()));
        assert_eq!(parse_line("a.b"), Some("a.b".to_string()));
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain(" Mail.Example.COM. "), "mail.example.com");
    }
}
