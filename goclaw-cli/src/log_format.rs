//! Custom event formatter for the file log: each line carries `trace_id` and
//! `span_id` from the current span scope so one agent turn's records can be
//! correlated across subsystems.

use std::fmt;

use tracing_core::Subscriber;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::{LookupSpan, SpanRef};

/// Plain-text formatter: `TIMESTAMP trace_id=X span_id=Y LEVEL target: fields`
/// when the event has a parent span, `TIMESTAMP LEVEL target: fields` otherwise.
/// The trace id is the root span's id, so everything spawned under one turn
/// shares it.
#[derive(Default)]
pub struct SpanIdFormat {
    timer: SystemTime,
}

impl SpanIdFormat {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S, N> FormatEvent<S, N> for SpanIdFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing_core::Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;
        if let Some(span) = ctx.parent_span() {
            let span_id = span.id().into_u64().to_string();
            let trace_id = span
                .scope()
                .from_root()
                .next()
                .map(|root: SpanRef<'_, S>| root.id().into_u64().to_string())
                .unwrap_or_else(|| span_id.clone());
            write!(writer, " trace_id={} span_id={}", trace_id, span_id)?;
        }

        write!(writer, " {}:", event.metadata().level())?;
        write!(writer, " {}: ", event.metadata().target())?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
