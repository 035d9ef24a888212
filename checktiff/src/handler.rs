//! Decoder fault handlers
//!
//! The decoder never prints or aborts on its own. Every error and warning is
//! handed to the [`DecoderHandler`] it was opened with, as a module name plus
//! unformatted [`fmt::Arguments`].

use crate::diagnostics::{DiagnosticSink, Severity};
use std::fmt;

/// Receiver for decoder errors and warnings
pub trait DecoderHandler {
    /// A fault that stops the current operation
    fn error(&mut self, module: &str, args: fmt::Arguments<'_>);

    /// Non-conforming but tolerable content
    fn warning(&mut self, module: &str, args: fmt::Arguments<'_>);
}

/// Emits every report as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl DecoderHandler for LogHandler {
    fn error(&mut self, module: &str, args: fmt::Arguments<'_>) {
        tracing::error!(module, "{}", args);
    }

    fn warning(&mut self, module: &str, args: fmt::Arguments<'_>) {
        tracing::warn!(module, "{}", args);
    }
}

/// Routes decoder reports into a [`DiagnosticSink`]
#[derive(Debug)]
pub struct SinkBridge<'s> {
    sink: &'s mut DiagnosticSink,
}

impl<'s> SinkBridge<'s> {
    /// Bridge into `sink` for the lifetime of one decode
    pub fn new(sink: &'s mut DiagnosticSink) -> Self {
        SinkBridge { sink }
    }

    fn forward(&mut self, severity: Severity, module: &str, args: fmt::Arguments<'_>) {
        let message = fmt::format(args);
        tracing::trace!(module, %severity, "{}", message);
        self.sink.record(severity, &message);
    }
}

impl DecoderHandler for SinkBridge<'_> {
    fn error(&mut self, module: &str, args: fmt::Arguments<'_>) {
        self.forward(Severity::Error, module, args);
    }

    fn warning(&mut self, module: &str, args: fmt::Arguments<'_>) {
        self.forward(Severity::Warning, module, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_formats_arguments() {
        let mut sink = DiagnosticSink::new();
        {
            let mut bridge = SinkBridge::new(&mut sink);
            bridge.error("img.tif", format_args!("Read error on strip {}", 7));
            bridge.warning(
                "img.tif",
                format_args!("Unknown field with tag {} ({:#x})", 50000, 50000),
            );
        }

        assert_eq!(sink.errors()[0].text(), "Read error on strip 7");
        assert_eq!(sink.warnings()[0].text(), "Unknown field with tag 50000 (0xc350)");
    }

    #[test]
    fn test_bridge_respects_sink_limit() {
        let mut sink = DiagnosticSink::new().with_message_limit(4);
        SinkBridge::new(&mut sink).error("m", format_args!("{}", "abcdefgh"));
        assert_eq!(sink.errors()[0].text(), "abcd");
    }

    #[test]
    fn test_log_handler_does_not_panic() {
        let mut handler = LogHandler;
        handler.error("m", format_args!("boom"));
        handler.warning("m", format_args!("hmm"));
    }
}
