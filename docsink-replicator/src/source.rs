use docsink::report::{ErrorReporter, Severity};
use docsink::types::ChangeEvent;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Counters of a source run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub forwarded: u64,
    pub rejected: u64,
}

/// Forwards newline-delimited JSON change events from `reader` to the sink.
///
/// Each non-blank line must be an object like `{"op": "insert", "data": {...}}`. Lines that
/// are not UTF-8 or do not parse are reported with [`Severity::Warning`] and skipped.
/// Forwarding stops at the end of input or when the sink stops receiving.
pub async fn forward_events<R>(
    mut reader: R,
    events_tx: mpsc::Sender<ChangeEvent>,
    reporter: ErrorReporter,
) -> std::io::Result<SourceStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut stats = SourceStats::default();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(err) => {
                reporter.report(
                    Severity::Warning,
                    format!("invalid change event: {err}"),
                    Some(Value::String(String::from_utf8_lossy(&buf).trim().to_owned())),
                );
                stats.rejected += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<ChangeEvent>(line) {
            Ok(event) => event,
            Err(err) => {
                reporter.report(
                    Severity::Warning,
                    format!("invalid change event: {err}"),
                    Some(Value::String(line.to_owned())),
                );
                stats.rejected += 1;
                continue;
            }
        };

        if events_tx.send(event).await.is_err() {
            debug!("sink stopped receiving, stopping event source");
            break;
        }
        stats.forwarded += 1;
    }

    info!(
        forwarded = stats.forwarded,
        rejected = stats.rejected,
        "event source completed"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use docsink::report::create_error_channel;
    use docsink::types::Operation;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn valid_lines_are_forwarded_in_order() {
        let input = concat!(
            r#"{"op": "insert", "data": {"id": "1"}}"#,
            "\n\n",
            r#"{"op": "delete", "data": {"id": "1"}}"#,
            "\n",
        );
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let (errors_tx, _errors_rx) = create_error_channel();

        let stats = forward_events(
            input.as_bytes(),
            events_tx,
            ErrorReporter::new("docsink", errors_tx),
        )
        .await
        .unwrap();

        assert_eq!(stats.forwarded, 2);
        assert_eq!(events_rx.recv().await.unwrap().op, Operation::Insert);
        assert_eq!(
            events_rx.recv().await.unwrap(),
            ChangeEvent::delete(json!({"id": "1"}))
        );
        assert!(events_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn invalid_lines_are_reported_and_skipped() {
        let input = "not json\n{\"op\": \"upsert\", \"data\": {}}\n{\"op\": \"update\", \"data\": 3}\n";
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let (errors_tx, mut errors_rx) = create_error_channel();

        let stats = forward_events(
            input.as_bytes(),
            events_tx,
            ErrorReporter::new("docsink", errors_tx),
        )
        .await
        .unwrap();

        assert_eq!(stats, SourceStats { forwarded: 1, rejected: 2 });
        assert_eq!(
            events_rx.recv().await.unwrap(),
            ChangeEvent::update(json!(3))
        );

        let first = errors_rx.try_recv().unwrap();
        assert_eq!(first.severity, Severity::Warning);
        assert_eq!(first.record, Some(json!("not json")));
        assert!(errors_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn non_utf8_lines_are_reported_and_skipped() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"op\": \"insert\", \"data\": {\"id\": 1}}\n");
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"op\": \"insert\", \"data\": {\"id\": 2}}");
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let (errors_tx, mut errors_rx) = create_error_channel();

        let stats = forward_events(
            input.as_slice(),
            events_tx,
            ErrorReporter::new("docsink", errors_tx),
        )
        .await
        .unwrap();

        assert_eq!(stats, SourceStats { forwarded: 2, rejected: 1 });
        assert_eq!(
            events_rx.recv().await.unwrap(),
            ChangeEvent::insert(json!({"id": 1}))
        );
        assert_eq!(
            events_rx.recv().await.unwrap(),
            ChangeEvent::insert(json!({"id": 2}))
        );

        let record = errors_rx.try_recv().unwrap();
        assert_eq!(record.severity, Severity::Warning);
        assert!(record.message.starts_with("invalid change event: "));
    }

    #[tokio::test]
    async fn forwarding_stops_when_sink_is_gone() {
        let input = "{\"op\": \"insert\", \"data\": {}}\n{\"op\": \"insert\", \"data\": {}}\n";
        let (events_tx, events_rx) = mpsc::channel(4);
        drop(events_rx);
        let (errors_tx, _errors_rx) = create_error_channel();

        let stats = forward_events(
            input.as_bytes(),
            events_tx,
            ErrorReporter::new("docsink", errors_tx),
        )
        .await
        .unwrap();

        assert_eq!(stats.forwarded, 0);
    }
}
