//! Text sinks: where relayed text ends up.
//!
//! Typing into the focused window is OS-specific and deliberately not done
//! here.  [`StdoutSink`] emits one line per delivery so the host can be piped
//! into whatever typing tool the desktop provides; [`LogSink`] only records
//! that a delivery happened.

use std::io::Write;
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::TextSink;
use crate::domain::config::SinkKind;

/// Writes each delivered text as one line on standard output.
///
/// Embedded line breaks are escaped (`\n`, `\r`) so that one delivery is
/// always exactly one output line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    /// The line written for `text`, without the trailing newline.
    pub fn format_line(text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('\r', "\\r")
            .replace('\n', "\\n")
    }
}

impl TextSink for StdoutSink {
    fn deliver(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}", Self::format_line(text)).and_then(|()| out.flush()) {
            warn!("stdout sink write failed: {e}");
        }
    }
}

/// Logs the size of each delivery and discards the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TextSink for LogSink {
    fn deliver(&self, text: &str) {
        info!("delivered {} chars", text.chars().count());
    }
}

/// Builds the sink selected in the configuration.
pub fn build_sink(kind: SinkKind) -> Arc<dyn TextSink> {
    match kind {
        SinkKind::Stdout => Arc::new(StdoutSink),
        SinkKind::Log => Arc::new(LogSink),
    }
}
