//! Tracker handle and background flush task.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use tracker_core::{
    ClickData, CustomData, EventPayload, FormSubmitData, PageViewData, Result, ScrollData,
    SearchData, SocialData, VideoData,
};

use crate::config::SdkConfig;
use crate::queue::{BatchQueue, QueuedEvent};
use crate::transport::{EventSink, WsTransport};
use crate::wire::Envelope;

/// Command queue depth between the handle and the flush task.
const COMMAND_BUFFER: usize = 1024;

enum Command {
    Track(QueuedEvent),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Handle over the background flush task.
///
/// Events are queued locally and flushed when the batch fills or the
/// connection goes idle; `close` drains the queue and emits a final
/// page-exit for the open page.
pub struct Tracker {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
    current_page: Mutex<Option<(String, Instant)>>,
}

impl Tracker {
    /// Connect the WebSocket transport and start the flush task.
    pub async fn connect(config: SdkConfig) -> Result<Self> {
        let transport = WsTransport::connect(&config).await?;
        Ok(Self::with_sink(config, transport))
    }

    /// Start the flush task over an arbitrary sink.
    pub fn with_sink<S: EventSink + 'static>(config: SdkConfig, sink: S) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = tokio::spawn(flush_task(config, sink, rx));
        Self {
            tx,
            worker,
            current_page: Mutex::new(None),
        }
    }

    /// Queue one event. Sanitization and derived fields are applied
    /// client-side as well, so redacted values never leave the process.
    pub async fn track(&self, mut payload: EventPayload) {
        payload.sanitize();
        payload.normalize();
        let event = QueuedEvent {
            payload,
            queued_at: Utc::now(),
        };
        if self.tx.send(Command::Track(event)).await.is_err() {
            warn!("Tracker is closed; event dropped");
        }
    }

    pub async fn page_view(&self, url: &str, title: Option<&str>, referrer: Option<&str>) {
        *self.current_page.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((url.to_string(), Instant::now()));
        self.track(EventPayload::PageView(PageViewData {
            url: url.to_string(),
            title: title.map(str::to_string),
            referrer: referrer.map(str::to_string),
            time_on_page: None,
        }))
        .await;
    }

    /// Emit a page-view for the open page carrying its time-on-page.
    /// `time_on_page` overrides the measured duration when given.
    pub async fn page_exit(&self, time_on_page: Option<f64>) {
        let open = self
            .current_page
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some((url, opened_at)) = open else {
            return;
        };
        let elapsed = time_on_page.unwrap_or_else(|| opened_at.elapsed().as_millis() as f64);
        self.track(EventPayload::PageView(PageViewData {
            url,
            title: None,
            referrer: None,
            time_on_page: Some(elapsed),
        }))
        .await;
    }

    pub async fn click(&self, data: ClickData) {
        self.track(EventPayload::Click(data)).await;
    }

    pub async fn scroll(&self, data: ScrollData) {
        self.track(EventPayload::Scroll(data)).await;
    }

    /// Debounced scroll reporting: only the last sample inside each quiet
    /// period is emitted.
    pub fn scroll_debouncer(&self, quiet: Duration) -> ScrollDebouncer {
        ScrollDebouncer {
            tx: self.tx.clone(),
            quiet,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn form_submit(&self, data: FormSubmitData) {
        self.track(EventPayload::FormSubmit(data)).await;
    }

    pub async fn video_play(&self, data: VideoData) {
        self.track(EventPayload::VideoPlay(data)).await;
    }

    pub async fn video_pause(&self, data: VideoData) {
        self.track(EventPayload::VideoPause(data)).await;
    }

    pub async fn search(&self, url: &str, query: &str, result_count: u64) {
        self.track(EventPayload::Search(SearchData {
            url: url.to_string(),
            query: query.to_string(),
            result_count,
            time_to_search_ms: None,
        }))
        .await;
    }

    pub async fn like(&self, url: &str, content_id: &str) {
        self.track(EventPayload::Like(social(url, content_id))).await;
    }

    pub async fn comment(&self, url: &str, content_id: &str) {
        self.track(EventPayload::Comment(social(url, content_id)))
            .await;
    }

    pub async fn share(&self, url: &str, content_id: &str) {
        self.track(EventPayload::Share(social(url, content_id)))
            .await;
    }

    pub async fn follow(&self, url: &str, content_id: &str) {
        self.track(EventPayload::Follow(social(url, content_id)))
            .await;
    }

    pub async fn custom(&self, url: &str, name: &str, metadata: serde_json::Value) {
        self.track(EventPayload::Custom(CustomData {
            url: url.to_string(),
            name: name.to_string(),
            metadata,
            tags: Vec::new(),
        }))
        .await;
    }

    /// Force a flush of the partial batch and wait for it to be sent.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Emit the final page-exit, drain the queue, and stop the flush task.
    pub async fn close(self) {
        self.page_exit(None).await;
        let _ = self.tx.send(Command::Close).await;
        let _ = self.worker.await;
    }
}

fn social(url: &str, content_id: &str) -> SocialData {
    SocialData {
        url: url.to_string(),
        content_id: content_id.to_string(),
        content_type: None,
        content_owner_id: None,
        active: true,
    }
}

/// Per-quiet-period scroll sampler. Each observation replaces the pending
/// one; the sample is emitted after `quiet` with no newer observation.
pub struct ScrollDebouncer {
    tx: mpsc::Sender<Command>,
    quiet: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ScrollDebouncer {
    pub fn observe(&self, mut data: ScrollData) {
        let tx = self.tx.clone();
        let quiet = self.quiet;
        data.scroll_percentage = Some(data.percentage());

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let event = QueuedEvent {
                payload: EventPayload::Scroll(data),
                queued_at: Utc::now(),
            };
            let _ = tx.send(Command::Track(event)).await;
        }));
    }
}

async fn flush_task<S: EventSink>(config: SdkConfig, mut sink: S, mut rx: mpsc::Receiver<Command>) {
    let mut queue = BatchQueue::new(config.batch_size);
    let mut deadline = Instant::now() + config.idle_timeout;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Track(event)) => {
                    if let Some(batch) = queue.push(event) {
                        flush_batch(&mut sink, batch).await;
                    } else {
                        // only a non-flushing enqueue resets the idle timer
                        deadline = Instant::now() + config.idle_timeout;
                    }
                }
                Some(Command::Flush(ack)) => {
                    flush_batch(&mut sink, queue.take()).await;
                    deadline = Instant::now() + config.idle_timeout;
                    let _ = ack.send(());
                }
                Some(Command::Close) | None => break,
            },
            _ = tokio::time::sleep_until(deadline) => {
                if !queue.is_empty() {
                    debug!(queued = queue.len(), "Idle flush");
                    flush_batch(&mut sink, queue.take()).await;
                }
                deadline = Instant::now() + config.idle_timeout;
            }
        }
    }

    flush_batch(&mut sink, queue.take()).await;
    sink.close().await;
}

/// The wire protocol is per-event, so a batch is sent as individual
/// frames. A frame that exhausts the transport's retry budget is dropped.
async fn flush_batch<S: EventSink>(sink: &mut S, batch: Vec<QueuedEvent>) {
    for event in batch {
        let frame = Envelope::new(&event.payload, event.queued_at).to_json();
        if let Err(e) = sink.send(frame).await {
            warn!(error = %e, "Event dropped");
        }
    }
}
