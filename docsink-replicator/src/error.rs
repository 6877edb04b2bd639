use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use docsink::error::SinkError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for replicator operations.
pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

/// Error type for the replicator binary.
pub enum ReplicatorError {
    /// Failure while running the sink.
    Run(anyhow::Error),
    /// Configuration error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl ReplicatorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Run(_) => "sink error",
            ReplicatorError::Config(_, _) => "configuration error",
            ReplicatorError::Io(_, _) => "i/o error",
        }
    }

    /// Returns the sink error behind a run failure, if any.
    pub fn as_sink_error(&self) -> Option<&SinkError> {
        match self {
            ReplicatorError::Run(err) => err.downcast_ref::<SinkError>(),
            ReplicatorError::Config(_, _) | ReplicatorError::Io(_, _) => None,
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Run(err) => match err.downcast_ref::<SinkError>() {
                Some(sink_error) => Some(sink_error.backtrace()),
                None => Some(err.backtrace()),
            },
            ReplicatorError::Config(_, captured) => Some(&captured.0),
            ReplicatorError::Io(_, captured) => Some(&captured.0),
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("replicator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

/// Renders the full report, which is what `main` prints when it returns an error.
impl fmt::Debug for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_report())
    }
}

impl fmt::Display for ReplicatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicatorError::Run(err) => write!(f, "{err}"),
            ReplicatorError::Config(source, _) => write!(f, "configuration error: {source}"),
            ReplicatorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ReplicatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReplicatorError::Run(err) => err.source(),
            ReplicatorError::Config(source, _) => Some(source.as_ref()),
            ReplicatorError::Io(source, _) => Some(source),
        }
    }
}

impl From<anyhow::Error> for ReplicatorError {
    fn from(err: anyhow::Error) -> Self {
        ReplicatorError::Run(err)
    }
}

impl From<std::io::Error> for ReplicatorError {
    fn from(err: std::io::Error) -> Self {
        ReplicatorError::Io(err, CapturedBacktrace::capture())
    }
}
