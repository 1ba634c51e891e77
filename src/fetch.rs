// ABOUTME: Remote import fetching over HTTP with bounded retry and backoff

use crate::config::{FETCH_BACKOFF_BASE, FETCH_MAX_RETRIES, FETCH_TIMEOUT};
use crate::driver::CancelToken;
use crate::error::Diagnostic;
use tracing::{debug, warn};

/// Fetch a remote module source.
///
/// Server errors (5xx) retry with exponential backoff up to
/// `FETCH_MAX_RETRIES` attempts; client errors and transport failures
/// surface immediately. Cancellation is honored between attempts.
pub fn fetch_remote(url: &str, cancel: &CancelToken) -> Result<String, Diagnostic> {
    let agent = ureq::AgentBuilder::new()
        .timeout(FETCH_TIMEOUT)
        .build();

    let mut attempt = 1u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Diagnostic::resolve(url, "compilation cancelled"));
        }
        debug!(url, attempt, "fetching remote import");
        match agent.get(url).call() {
            Ok(response) => {
                return response
                    .into_string()
                    .map_err(|e| Diagnostic::resolve(url, format!("reading body: {}", e)));
            }
            Err(ureq::Error::Status(code, _)) if (500..600).contains(&code) => {
                if attempt >= FETCH_MAX_RETRIES {
                    return Err(Diagnostic::resolve(
                        url,
                        format!("HTTP {} after {} attempts", code, attempt),
                    ));
                }
                let delay = FETCH_BACKOFF_BASE * 2u32.pow(attempt - 1);
                warn!(url, code, attempt, ?delay, "server error, backing off");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(Diagnostic::resolve(url, format!("HTTP {}", code)));
            }
            Err(e) => {
                return Err(Diagnostic::resolve(url, e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_host_is_resolve_error() {
        let cancel = CancelToken::new();
        let err = fetch_remote("http://127.0.0.1:1/m.quill", &cancel).unwrap_err();
        assert_eq!(err.kind(), crate::error::DiagnosticKind::Resolve);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = fetch_remote("http://127.0.0.1:1/m.quill", &cancel).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
