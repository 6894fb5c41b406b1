use thiserror::Error;

/// Error taxonomy shared by the transport client and the combinators.
///
/// Each variant is one terminal condition a caller can observe; the
/// combinators and the client never map one condition onto another except
/// where documented (a race deadline surfacing as a per-call timeout).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection open timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Command '{method}' timed out after {timeout_ms}ms")]
    CallTimeout { method: String, timeout_ms: u64 },

    #[error("Remote error: {message}")]
    Remote { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Cancelled")]
    Cancelled,

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Batch failed: {}", batch_summary(.failures))]
    Batch { failures: Vec<(usize, Error)> },

    #[error("Condition not met within {timeout_ms}ms")]
    PollTimeout { timeout_ms: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One line per failing index so no batch failure is silently dropped.
fn batch_summary(failures: &[(usize, Error)]) -> String {
    let items: Vec<String> = failures
        .iter()
        .map(|(index, err)| format!("[{}] {}", index, err))
        .collect();
    format!("{} item(s) failed: {}", failures.len(), items.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_lists_every_index() {
        let err = Error::Batch {
            failures: vec![
                (1, Error::Other("boom".into())),
                (3, Error::Cancelled),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 item(s) failed"));
        assert!(text.contains("[1] boom"));
        assert!(text.contains("[3] Cancelled"));
    }

    #[test]
    fn test_call_timeout_names_method() {
        let err = Error::CallTimeout {
            method: "Page.navigate".into(),
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("Page.navigate"));
        assert!(err.to_string().contains("5000ms"));
    }
}
