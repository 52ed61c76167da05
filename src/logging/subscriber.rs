//! tracing integration
//!
//! Installs a subscriber whose main layer writes every formatted event into the
//! [`LogSink`], plus a stderr layer for console output and the sink's own
//! side-channel diagnostics.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use super::normalize::TIMESTAMP_FORMAT;
use super::sink::LogSink;
use super::SIDE_CHANNEL;

/// Renders event timestamps in the canonical prefix format, so the sink keeps
/// them instead of stamping the line again
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalTime;

impl FormatTime for CanonicalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(TIMESTAMP_FORMAT))
    }
}

/// A writer that hands each formatted event to the sink
pub struct SinkWriter {
    sink: Arc<LogSink>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.sink.add(&text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer factory for tracing-subscriber
pub struct SinkMakeWriter {
    sink: Arc<LogSink>,
}

impl SinkMakeWriter {
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self { sink }
    }
}

impl<'a> MakeWriter<'a> for SinkMakeWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: Arc::clone(&self.sink),
        }
    }
}

fn is_side_channel(target: &str) -> bool {
    target == SIDE_CHANNEL
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default filter, which admits the sink's minimum
/// severity and above. With `console` off, stderr only receives side-channel
/// events.
pub fn init_logging(sink: Arc<LogSink>, console: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(sink.min_level().tracing_directive()));

    let sink_layer = tracing_subscriber::fmt::layer()
        .with_writer(SinkMakeWriter::new(sink))
        .with_ansi(false)
        .with_target(true)
        .with_timer(CanonicalTime)
        .with_filter(filter_fn(|meta| !is_side_channel(meta.target())));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_timer(CanonicalTime)
        .with_filter(filter_fn(move |meta| {
            console || is_side_channel(meta.target())
        }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(sink_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
