use qr_core::error::AppError;

const BODY_SNIPPET_CHARS: usize = 200;

/// Map a ureq failure to `code`. Transport failures, 429 and 5xx are retryable.
pub(crate) fn call_error(code: &str, message: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            let snippet: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
            AppError::new(code, message)
                .with_details(format!("status={status}; body={snippet}"))
                .with_retryable(status == 429 || status >= 500)
        }
        ureq::Error::Transport(t) => AppError::new(code, message)
            .with_details(t.to_string())
            .with_retryable(true),
    }
}
