//! Trailing-edge debouncing
//!
//! Bursty sources (active document, configuration, repository set,
//! per-repository change reasons) are funnelled through a `ChangeAggregator`
//! so that downstream consumers see one batch per burst instead of one
//! refresh per event.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default quiet period before a burst is delivered
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

enum Command<E> {
    Event(E),
    Flush,
}

/// Debounced event coalescer
///
/// Every pushed event (re)arms a timer; when the timer expires without a new
/// event the accumulated batch is handed to the handler in arrival order.
/// The aggregator owns its task: `dispose()` or dropping the aggregator
/// cancels it and discards anything still pending.
pub struct ChangeAggregator<E> {
    /// Label used in log lines
    label: String,

    /// Command channel into the debounce task
    tx: mpsc::UnboundedSender<Command<E>>,

    /// Cancels the debounce task
    shutdown: CancellationToken,

    /// Debounce task
    task: JoinHandle<()>,
}

impl<E: Send + 'static> ChangeAggregator<E> {
    /// Spawn a new aggregator on the current tokio runtime
    pub fn spawn<F>(label: impl Into<String>, delay: Duration, handler: F) -> Self
    where
        F: FnMut(Vec<E>) + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(label.clone(), delay, rx, shutdown.clone(), handler));
        debug!("{}: aggregator started (delay: {:?})", label, delay);

        Self {
            label,
            tx,
            shutdown,
            task,
        }
    }

    /// Queue an event; returns false once the aggregator is gone
    pub fn push(&self, event: E) -> bool {
        self.tx.send(Command::Event(event)).is_ok()
    }

    /// Deliver whatever is pending right away
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }
}

impl<E> ChangeAggregator<E> {
    /// Stop the debounce task, discarding pending events
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            trace!("{}: disposing aggregator", self.label);
            self.shutdown.cancel();
        }
    }

    /// Whether the aggregator no longer delivers events
    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled() || self.task.is_finished()
    }
}

impl<E> Drop for ChangeAggregator<E> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run<E, F>(
    label: String,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<Command<E>>,
    shutdown: CancellationToken,
    mut handler: F,
) where
    F: FnMut(Vec<E>),
{
    let mut pending: Vec<E> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let next_deadline = deadline;

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                if !pending.is_empty() {
                    debug!("{}: dropping {} pending events on dispose", label, pending.len());
                }
                break;
            }
            command = rx.recv() => match command {
                Some(Command::Event(event)) => {
                    pending.push(event);
                    deadline = Some(Instant::now() + delay);
                }
                Some(Command::Flush) => {
                    deadline = None;
                    deliver(&label, &mut pending, &mut handler);
                }
                None => break,
            },
            () = async move {
                if let Some(at) = next_deadline {
                    sleep_until(at).await;
                }
            }, if next_deadline.is_some() => {
                deadline = None;
                deliver(&label, &mut pending, &mut handler);
            }
        }
    }
}

fn deliver<E, F>(label: &str, pending: &mut Vec<E>, handler: &mut F)
where
    F: FnMut(Vec<E>),
{
    if pending.is_empty() {
        return;
    }

    let batch = std::mem::take(pending);
    trace!("{}: delivering {} coalesced events", label, batch.len());
    handler(batch);
}
