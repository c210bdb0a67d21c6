use std::io::Read;
use std::time::Duration;

use qr_core::error::AppError;

use crate::http::call_error;

/// Upper bound on a fetched page body.
pub const MAX_PAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Fetch an `http`/`https` page body for the HTML loader.
pub fn fetch_page(url: &str, timeout: Duration) -> Result<Vec<u8>, AppError> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::new("LOAD_UNSUPPORTED", "Only http and https URLs can be fetched")
            .with_details(format!("url={url}")));
    }

    let resp = ureq::get(url)
        .timeout(timeout)
        .call()
        .map_err(|e| call_error("LOAD_FAILED", "Failed to fetch page", e))?;

    let mut body = Vec::new();
    resp.into_reader()
        .take(MAX_PAGE_BYTES)
        .read_to_end(&mut body)
        .map_err(|e| {
            AppError::new("LOAD_FAILED", "Failed to read page body")
                .with_details(format!("url={url}; err={e}"))
        })?;
    tracing::debug!(url, bytes = body.len(), "page fetched");
    Ok(body)
}
