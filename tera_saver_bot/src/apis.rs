use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// What went wrong while resolving a share link.
#[derive(Debug)]
pub enum ResolveError {
    Request(reqwest::Error),
    Status(StatusCode),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Request(e) => write!(f, "resolver request failed: {}", e),
            ResolveError::Status(status) => write!(f, "resolver answered {}", status),
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(value: reqwest::Error) -> Self {
        ResolveError::Request(value)
    }
}

/// Ask the resolver to turn a share link into a direct video URL.
/// One call, no retries; anything but a success status is a failure.
/// The body comes back as plaintext with stray whitespace around it.
pub async fn resolve_video_url(
    http: &Client,
    resolver_url: &str,
    link: &str,
) -> Result<String, ResolveError> {
    let response = http
        .get(format!("{}?link={}", resolver_url, link))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ResolveError::Status(response.status()));
    }
    Ok(response.text().await?.trim().to_string())
}

/// The shortener endpoints all answer `{"shortenedUrl": "..."}`.
#[derive(Deserialize)]
struct ShortenerResponse {
    #[serde(rename = "shortenedUrl")]
    shortened_url: Option<String>,
}

/// Pull the shortened URL out of a shortener response body, if the
/// body actually carries one.
fn extract_short_url(body: &str) -> Option<String> {
    serde_json::from_str::<ShortenerResponse>(body)
        .ok()?
        .shortened_url
        .filter(|url| !url.is_empty())
}

/// Run `long_url` through the given shortener endpoint. Degrades
/// gracefully: any failure hands the long URL back unchanged.
pub async fn shorten_url(http: &Client, api_template: &str, long_url: &str) -> String {
    let body: Result<String, reqwest::Error> = async {
        let response = http
            .get(format!("{}{}", api_template, long_url))
            .send()
            .await?
            .error_for_status()?;
        response.text().await
    }
    .await;

    match body.as_deref().map(extract_short_url) {
        Ok(Some(short_url)) => short_url,
        Ok(None) => {
            log::warn!("Shortener answered without a shortenedUrl; using the long URL");
            long_url.to_string()
        }
        Err(e) => {
            log::warn!("Could not shorten a URL: {}", e);
            long_url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn shortener_body_happy_path() {
        let body = r#"{"shortenedUrl": "https://short.example/abc"}"#;
        assert_eq!(
            extract_short_url(body).unwrap(),
            "https://short.example/abc"
        );
    }

    #[test]
    fn shortener_body_tolerates_extra_fields() {
        let body = r#"{"status": "success", "shortenedUrl": "https://short.example/abc"}"#;
        assert_eq!(
            extract_short_url(body).unwrap(),
            "https://short.example/abc"
        );
    }

    #[test]
    fn shortener_body_without_the_field_is_rejected() {
        assert_eq!(extract_short_url(r#"{"status": "error"}"#), None);
    }

    #[test]
    fn shortener_body_with_an_empty_url_is_rejected() {
        assert_eq!(extract_short_url(r#"{"shortenedUrl": ""}"#), None);
    }

    #[test]
    fn shortener_body_that_is_not_json_is_rejected() {
        assert_eq!(extract_short_url("<html>504</html>"), None);
    }
}
