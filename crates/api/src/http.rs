//! Shared request and row-filtering helpers for the rate adapters.

use lendwatch_protocol::{SourceError, TokenRate};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Send a request and decode a JSON body, mapping failures to [`SourceError`].
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    protocol: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, SourceError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Upstream {
            protocol: protocol.to_string(),
            status,
            body: truncate(&body, 256),
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Malformed {
        protocol: protocol.to_string(),
        reason: e.to_string(),
    })
}

/// Keep rows that satisfy the rate invariants, logging the rest.
pub(crate) fn valid_rows(
    protocol: &str,
    rows: impl IntoIterator<Item = TokenRate>,
) -> Vec<TokenRate> {
    rows.into_iter()
        .filter(|rate| match rate.validate() {
            Ok(()) => true,
            Err(violation) => {
                warn!(
                    protocol = protocol,
                    token = %rate.token,
                    reason = %violation,
                    "Dropping invalid token rate"
                );
                false
            }
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
