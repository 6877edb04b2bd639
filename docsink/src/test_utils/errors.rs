use std::time::Duration;

use crate::report::{AdaptorError, ErrorRx};

/// Returns the records currently buffered in the error channel without waiting.
pub fn drain_errors(errors_rx: &mut ErrorRx) -> Vec<AdaptorError> {
    let mut errors = Vec::new();
    while let Ok(error) = errors_rx.try_recv() {
        errors.push(error);
    }

    errors
}

/// Waits for the next record of the error channel.
///
/// # Panics
///
/// Panics if no record arrives within `timeout` or the channel is closed.
pub async fn next_error(errors_rx: &mut ErrorRx, timeout: Duration) -> AdaptorError {
    match tokio::time::timeout(timeout, errors_rx.recv()).await {
        Ok(Some(error)) => error,
        Ok(None) => panic!("error channel closed before a record was emitted"),
        Err(_) => panic!("no error record emitted within {timeout:?}"),
    }
}
