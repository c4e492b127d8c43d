use crate::domain::audit::AuditEvent;
use crate::error::Result;
use std::io::Write;

/// Writes an audit trail as CSV with the columns `stage,outcome,detail`.
///
/// `detail` is the event payload rendered for humans: the intent summary, the error
/// message or the note. Events without a payload leave it empty.
pub struct AuditWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AuditWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_events<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a AuditEvent>,
    {
        self.writer.write_record(["stage", "outcome", "detail"])?;
        for event in events {
            let detail = event
                .payload
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.writer.write_record([
                event.stage.to_string(),
                event.outcome.to_string(),
                detail,
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
