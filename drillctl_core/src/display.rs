//! Display sink collaborator — a write-only line-oriented status stream.
//!
//! No concrete terminal/serial implementation lives in this crate; a
//! deployment wires in whatever character display this machine actually
//! has. [`NullDisplaySink`] is the default, discarding everything, so the
//! core runs unmodified with nothing attached.

/// Write-only sink for short operator-facing status lines.
pub trait DisplaySink: Send {
    fn write_line(&mut self, line: &str);
}

/// Discards every line. Used when no physical display is configured.
#[derive(Debug, Default)]
pub struct NullDisplaySink;

impl DisplaySink for NullDisplaySink {
    fn write_line(&mut self, _line: &str) {}
}

pub const MSG_LOAD_WORKPIECE: &str = "LOAD WORKPIECE / PRESS START";
pub const MSG_PAUSED: &str = "PAUSED";
pub const MSG_UNLOAD: &str = "OPEN AND UNLOAD / PRESS START FOR NEXT CYCLE";

#[cfg(test)]
mod tests {
    use super::*;

    struct CapturingSink(Vec<String>);

    impl DisplaySink for CapturingSink {
        fn write_line(&mut self, line: &str) {
            self.0.push(line.to_string());
        }
    }

    #[test]
    fn capturing_sink_records_lines() {
        let mut sink = CapturingSink(Vec::new());
        sink.write_line(MSG_LOAD_WORKPIECE);
        assert_eq!(sink.0, vec![MSG_LOAD_WORKPIECE.to_string()]);
    }

    #[test]
    fn null_sink_discards() {
        let mut sink = NullDisplaySink;
        sink.write_line("anything");
    }
}
