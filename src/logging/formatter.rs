//! Compact colored event formatter for local development.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::field::MakeExt;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormattedFields};
use tracing_subscriber::registry::LookupSpan;
use yansi::{Condition, Paint};

/// `HH:MM:SS.mmm LEVEL span{fields}: target: message key=value`
pub struct CustomPrettyFormatter;

impl<S, N> FormatEvent<S, N> for CustomPrettyFormatter
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
        let color = if writer.has_ansi_escapes() {
            Condition::ALWAYS
        } else {
            Condition::NEVER
        };
        let meta = event.metadata();

        let now = chrono::Utc::now().format("%H:%M:%S%.3f").to_string();
        write!(writer, "{} ", now.dim().whenever(color))?;

        let level = format!("{:>5}", meta.level());
        let level = match *meta.level() {
            Level::ERROR => level.red().bold(),
            Level::WARN => level.yellow().bold(),
            Level::INFO => level.green(),
            Level::DEBUG => level.blue(),
            Level::TRACE => level.magenta(),
        };
        write!(writer, "{} ", level.whenever(color))?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name().bold().whenever(color))?;
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>()
                    && !fields.is_empty()
                {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        write!(writer, "{}: ", meta.target().dim().whenever(color))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Space-delimited `key=value` fields with the message unquoted.
pub fn compact_fields() -> impl for<'w> FormatFields<'w> + 'static {
    format::debug_fn(|writer, field, value| {
        if field.name() == "message" {
            write!(writer, "{value:?}")
        } else {
            write!(writer, "{}={value:?}", field.name())
        }
    })
    .delimited(" ")
}
