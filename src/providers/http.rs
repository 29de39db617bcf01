//! HTTP plumbing shared by the REST-backed adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::warn;

use super::ProviderError;

/// Safety limit for paginated listings.
pub const MAX_PAGES: usize = 200;

pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cloudspend/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::configuration(format!("http client: {e}")))
}

/// A listing that still has pages at [`MAX_PAGES`] is incomplete and must
/// not be treated as the full inventory.
pub fn pagination_limit_exceeded(url: &str) -> ProviderError {
    warn!(url, pages = MAX_PAGES, "Listing still paging at safety limit");
    ProviderError::malformed(format!(
        "pagination limit of {MAX_PAGES} pages exceeded for {url}"
    ))
}

/// Map a provider response onto the adapter error taxonomy.
pub async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProviderError::Authentication {
                details: format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
            })
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            Err(ProviderError::RateLimited { retry_after })
        }
        status if status.is_server_error() => {
            let body = resp.text().await.ok().map(|b| truncate(&b));
            Err(ProviderError::Unavailable {
                status: status.as_u16(),
                body,
            })
        }
        status => {
            let body = resp.text().await.ok().map(|b| truncate(&b));
            Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(512).collect()
}
