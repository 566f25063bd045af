//! Compact stdout format.
//!
//! Lines look like
//! `[INFO] [10-19|12:00:01.123] batch: flushing batch group_id=1 reason=size size=3`,
//! where `batch:` is the scope of the current spans, if any.
use std::fmt;

use nu_ansi_term::{Color, Style};
use time::format_description::OwnedFormatItem;
use tracing::{Event, Level, Subscriber, field};
use tracing_subscriber::field::{RecordFields, VisitFmt, VisitOutput};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const TIME_FORMAT: &str = "[month]-[day]|[hour]:[minute]:[second].[subsecond digits:3]";

pub struct SaverFormat {
    time_format: Option<OwnedFormatItem>,
    with_target: bool,
}

/// Writes `message key=value ...`, the message always first.
struct FieldVisitor<'a> {
    writer: Writer<'a>,
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl SaverFormat {
    /// Also print the event target (usually the module path).
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    fn write_level(&self, writer: &mut Writer<'_>, level: &Level) -> fmt::Result {
        if !writer.has_ansi_escapes() {
            return write!(writer, "[{level}]");
        }

        let color = match *level {
            Level::TRACE => Color::Purple,
            Level::DEBUG => Color::Blue,
            Level::INFO => Color::Green,
            Level::WARN => Color::Yellow,
            Level::ERROR => Color::Red,
        };

        write!(writer, "[{}]", color.paint(level.as_str()))
    }

    fn write_time(&self, writer: &mut Writer<'_>) -> fmt::Result {
        let now = time::OffsetDateTime::from(std::time::SystemTime::now());

        let formatted = self
            .time_format
            .as_ref()
            .and_then(|time_format| now.format(time_format).ok());

        match formatted {
            Some(formatted) => write!(writer, "[{formatted}]"),
            None => write!(writer, "[<unknown-timestamp>]"),
        }
    }
}

impl<S, N> FormatEvent<S, N> for SaverFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        self.write_level(&mut writer, meta.level())?;
        writer.write_char(' ')?;
        self.write_time(&mut writer)?;
        writer.write_char(' ')?;

        if self.with_target {
            let target = format!("{}:", meta.target());
            if writer.has_ansi_escapes() {
                write!(writer, "{} ", Style::new().dimmed().paint(target))?;
            } else {
                write!(writer, "{target} ")?;
            }
        }

        if let Some(scope) = ctx.event_scope() {
            let names = scope
                .from_root()
                .map(|span| span.name())
                .collect::<Vec<_>>();
            write!(writer, "{}: ", names.join(":"))?;
        }

        ctx.format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

impl<'w> FormatFields<'w> for SaverFormat {
    fn format_fields<R: RecordFields>(&self, writer: Writer<'w>, fields: R) -> fmt::Result {
        let mut visitor = FieldVisitor::new(writer);
        fields.record(&mut visitor);
        visitor.finish()
    }
}

impl<'a> FieldVisitor<'a> {
    fn new(writer: Writer<'a>) -> Self {
        Self {
            writer,
            message: None,
            fields: Vec::new(),
        }
    }
}

impl field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}

impl VisitOutput<fmt::Result> for FieldVisitor<'_> {
    fn finish(mut self) -> fmt::Result {
        let ansi = self.writer.has_ansi_escapes();
        let mut separator = "";

        if let Some(message) = &self.message {
            write!(self.writer, "{message}")?;
            separator = " ";
        }

        for (name, value) in &self.fields {
            if ansi {
                let color = if *name == "error" {
                    Color::Red
                } else {
                    Color::Blue
                };
                write!(self.writer, "{separator}{name}={}", color.paint(value.as_str()))?;
            } else {
                write!(self.writer, "{separator}{name}={value}")?;
            }
            separator = " ";
        }

        Ok(())
    }
}

impl VisitFmt for FieldVisitor<'_> {
    fn writer(&mut self) -> &mut dyn fmt::Write {
        &mut self.writer
    }
}

impl Default for SaverFormat {
    fn default() -> Self {
        // Falls back to `[<unknown-timestamp>]` if the description is rejected.
        let time_format = time::format_description::parse_owned::<2>(TIME_FORMAT).ok();

        Self {
            time_format,
            with_target: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing::{debug, info_span, warn};
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn output(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(format: SaverFormat, f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::TRACE)
            .with_writer(captured.clone())
            .event_format(format)
            .fmt_fields(SaverFormat::default())
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        captured.output()
    }

    #[test]
    fn test_format_event() {
        let group_id = "1".to_string();
        let output = capture(SaverFormat::default(), || {
            debug!(group_id = %group_id, size = 3, "flushing batch");
        });

        assert!(output.starts_with("[DEBUG] ["), "{output}");
        assert!(output.ends_with("] flushing batch group_id=1 size=3\n"), "{output}");
    }

    #[test]
    fn test_format_span_scope_and_target() {
        let output = capture(SaverFormat::default().with_target(true), || {
            let _span = info_span!("batch").entered();
            warn!(error = "boom", "write failed");
        });

        assert!(output.starts_with("[WARN] ["), "{output}");
        assert!(output.contains(&format!("{}: batch: write failed", module_path!())), "{output}");
        assert!(output.ends_with("error=\"boom\"\n"), "{output}");
    }
}
