//! # Span Processor Interface
//!
//! Span processors sit between span end and the exporter: a processor
//! receives every finished [`SpanData`] and decides when batches reach the
//! configured [`SpanExporter`].
//!
//! Two built-in processors cover the two timing domains of the crate:
//! [`SimpleSpanProcessor`] hands each span to the exporter synchronously on
//! the thread that ended it, [`BatchSpanProcessor`] queues spans to a
//! dedicated background thread that flushes on a periodic schedule. Spans
//! ended by interceptors are visible through a simple processor as soon as
//! the call returns; spans managed by the caller and reported through a batch
//! processor become visible within the schedule delay, so consumers poll with
//! a timeout.
use crate::error::{TraceError, TraceResult};
use crate::trace::{SpanData, SpanExporter};
use crate::{wiretrace_debug, wiretrace_warn};
use std::cmp::min;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use std::{env, str::FromStr};

/// Delay interval between two consecutive exports.
pub(crate) const WIRETRACE_BSP_SCHEDULE_DELAY: &str = "WIRETRACE_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub(crate) const WIRETRACE_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 1_000;
/// Maximum queue size.
pub(crate) const WIRETRACE_BSP_MAX_QUEUE_SIZE: &str = "WIRETRACE_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub(crate) const WIRETRACE_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to WIRETRACE_BSP_MAX_QUEUE_SIZE.
pub(crate) const WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE: &str = "WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub(crate) const WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;

/// `SpanProcessor` is an interface invoked when a span is ended.
pub trait SpanProcessor: Send + Sync + std::fmt::Debug {
    /// `on_end` is called after a span is ended (i.e., the end timestamp is
    /// already set). This method is called synchronously within the
    /// [`Span::end`] API, therefore it should not block or throw an exception.
    ///
    /// [`Span::end`]: crate::trace::Span::end
    fn on_end(&self, span: SpanData);
    /// Force the spans lying in the cache to be exported.
    fn force_flush(&self) -> TraceResult<()>;
    /// Shuts down the processor. Implementations should make sure shutdown
    /// can be called multiple times.
    fn shutdown(&self) -> TraceResult<()>;
}

/// A [`SpanProcessor`] that passes finished spans to the configured
/// [`SpanExporter`] as soon as they are finished, without any batching.
///
/// Keeps each call's records visible in completion order the moment control
/// returns to the caller, which is what the in-process recorder scenarios
/// rely on.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
}

impl SimpleSpanProcessor {
    /// Create a new [`SimpleSpanProcessor`] using the provided exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        Self {
            exporter: Mutex::new(exporter),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(TraceError::from)
            .and_then(|mut exporter| exporter.export(vec![span]));

        if let Err(err) = result {
            wiretrace_debug!(
                name: "SimpleProcessor.OnEnd.Error",
                reason = format!("{:?}", err)
            );
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        // Nothing to flush for simple span processor.
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.shutdown();
            Ok(())
        } else {
            Err(TraceError::Other(
                "SimpleSpanProcessor mutex poison at shutdown".into(),
            ))
        }
    }
}

/// Messages exchanged between the caller threads and the background thread.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum BatchMessage {
    ExportSpan(SpanData),
    ForceFlush(SyncSender<TraceResult<()>>),
    Shutdown(SyncSender<TraceResult<()>>),
}

/// A batch span processor with a dedicated background thread.
///
/// Finished spans are queued onto a bounded channel and exported by the
/// background thread whenever a full batch accumulates or the schedule delay
/// elapses, whichever comes first. The default schedule delay is one second,
/// which bounds how long a caller-managed span can stay invisible after its
/// scope closes.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_span_count: Arc<AtomicUsize>,
}

impl BatchSpanProcessor {
    /// Creates a new instance of `BatchSpanProcessor`.
    pub fn new<E>(mut exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (message_sender, message_receiver) = sync_channel(config.max_queue_size);

        let handle = thread::Builder::new()
            .name("WiretraceBatchSpanProcessor".to_string())
            .spawn(move || {
                let mut spans = Vec::new();
                let mut last_export_time = Instant::now();

                loop {
                    let timeout = config
                        .scheduled_delay
                        .saturating_sub(last_export_time.elapsed());
                    match message_receiver.recv_timeout(timeout) {
                        Ok(message) => match message {
                            BatchMessage::ExportSpan(span) => {
                                spans.push(span);
                                if spans.len() >= config.max_export_batch_size
                                    || last_export_time.elapsed() >= config.scheduled_delay
                                {
                                    if let Err(err) = exporter.export(spans.split_off(0)) {
                                        wiretrace_debug!(
                                            name: "BatchSpanProcessor.Export.Error",
                                            reason = format!("{:?}", err)
                                        );
                                    }
                                    last_export_time = Instant::now();
                                }
                            }
                            BatchMessage::ForceFlush(sender) => {
                                let result = exporter.export(spans.split_off(0));
                                let _ = sender.send(result);
                                last_export_time = Instant::now();
                            }
                            BatchMessage::Shutdown(sender) => {
                                let result = exporter.export(spans.split_off(0));
                                exporter.shutdown();
                                let _ = sender.send(result);
                                break;
                            }
                        },
                        Err(RecvTimeoutError::Timeout) => {
                            if last_export_time.elapsed() >= config.scheduled_delay {
                                if let Err(err) = exporter.export(spans.split_off(0)) {
                                    wiretrace_debug!(
                                        name: "BatchSpanProcessor.Export.Error",
                                        reason = format!("{:?}", err)
                                    );
                                }
                                last_export_time = Instant::now();
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            wiretrace_debug!(name: "BatchSpanProcessor.ChannelDisconnected");
                            break;
                        }
                    }
                }
            })
            .expect("Failed to spawn thread");

        Self {
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            is_shutdown: AtomicBool::new(false),
            dropped_span_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a builder for a `BatchSpanProcessor` around the given exporter.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        if !span.span_context.is_sampled() {
            return;
        }
        let result = self.message_sender.try_send(BatchMessage::ExportSpan(span));

        if result.is_err() {
            // Emit a warning the first time a span is dropped.
            if self.dropped_span_count.fetch_add(1, Ordering::Relaxed) == 0 {
                wiretrace_warn!(
                    name: "BatchSpanProcessor.SpanDroppingStarted",
                    message = "BatchSpanProcessor dropped a span due to queue full/internal errors."
                );
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|_| TraceError::Other("Failed to send ForceFlush message".into()))?;

        receiver
            .recv_timeout(self.forceflush_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.forceflush_timeout))?
    }

    fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let dropped_spans = self.dropped_span_count.load(Ordering::Relaxed);
        if dropped_spans > 0 {
            wiretrace_warn!(
                name: "BatchSpanProcessor.Shutdown.DroppedSpans",
                dropped_span_count = dropped_spans
            );
        }
        let (sender, receiver) = sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::Shutdown(sender))
            .map_err(|_| TraceError::Other("Failed to send Shutdown message".into()))?;

        let result = receiver
            .recv_timeout(self.shutdown_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.shutdown_timeout))?;
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    return Err(TraceError::Other(
                        "Background thread panicked during shutdown".into(),
                    ));
                }
            }
        }
        result
    }
}

/// Builder for [`BatchSpanProcessor`].
#[derive(Debug, Default)]
pub struct BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the [`BatchConfig`] for the processor under construction.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build a new instance of `BatchSpanProcessor`.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

/// Batch span processor configuration.
/// Use [`BatchConfigBuilder`] to configure your own instance of [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfig {
    /// The maximum queue size to buffer spans for delayed processing. If the
    /// queue gets full it drops the spans. The default value is 2048.
    pub(crate) max_queue_size: usize,

    /// The delay interval between two consecutive processing of batches. The
    /// default value is 1 second.
    pub(crate) scheduled_delay: Duration,

    /// The maximum number of spans to process in a single batch. The default
    /// value is 512.
    pub(crate) max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl Default for BatchConfigBuilder {
    /// Create a new [`BatchConfigBuilder`] initialized with the default batch
    /// config values. The values are overridden by environment variables if
    /// set. The supported environment variables are:
    /// * `WIRETRACE_BSP_MAX_QUEUE_SIZE`
    /// * `WIRETRACE_BSP_SCHEDULE_DELAY`
    /// * `WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE`
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: WIRETRACE_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(WIRETRACE_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set max_queue_size for [`BatchConfigBuilder`].
    /// It's the maximum queue size to buffer spans for delayed processing.
    /// If the queue gets full it will drop the spans.
    /// The default value is 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set max_export_batch_size for [`BatchConfigBuilder`].
    /// It's the maximum number of spans to process in a single batch. If there
    /// are more than one batch worth of spans then it processes multiple
    /// batches of spans one batch after the other without any delay. The
    /// default value is 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set scheduled_delay for [`BatchConfigBuilder`].
    /// It's the delay interval between two consecutive processing of batches.
    /// The default value is 1000 milliseconds.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Builds a `BatchConfig` enforcing the following invariants:
    /// * `max_export_batch_size` must be less than or equal to `max_queue_size`.
    pub fn build(self) -> BatchConfig {
        // max export batch size must be less or equal to max queue size.
        let max_export_batch_size = min(self.max_export_batch_size, self.max_queue_size);

        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = env::var(WIRETRACE_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(WIRETRACE_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(&delay).ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(WIRETRACE_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        // max export batch size must be less or equal to max queue size.
        if self.max_export_batch_size > self.max_queue_size {
            self.max_export_batch_size = self.max_queue_size;
        }

        self
    }
}
