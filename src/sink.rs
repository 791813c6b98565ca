//! Result sinks.
//!
//! Sinks receive session events on the controller's event thread, in the
//! order the transitions happened. A sink may call back into the controller
//! (for example to `reset()` after a scan).

use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::session::SessionEvent;
use crate::DecodedValue;

/// Receiver of session events.
pub trait ResultSink: Send + 'static {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> ResultSink for F
where
    F: Fn(&SessionEvent) + Send + 'static,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Fan out to two sinks, in order.
impl<A: ResultSink, B: ResultSink> ResultSink for (A, B) {
    fn on_event(&self, event: &SessionEvent) {
        self.0.on_event(event);
        self.1.on_event(event);
    }
}

// ----------------------------------------------------------------------------
// LoggingSink
// ----------------------------------------------------------------------------

/// Logs every event, at warn/error level for failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

impl ResultSink for LoggingSink {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Started => log::info!("camera started"),
            SessionEvent::Scanned(value) => log::info!("barcode scanned: {}", value),
            SessionEvent::Stopped => log::info!("scan cancelled"),
            SessionEvent::Error { code, message } => {
                log::error!("scan failed [{}]: {}", code, message)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// ScanLog
// ----------------------------------------------------------------------------

/// Append-only list of scanned values, shared between the sink and readers.
#[derive(Clone, Debug, Default)]
pub struct ScanLog {
    entries: Arc<Mutex<Vec<DecodedValue>>>,
}

impl ScanLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DecodedValue>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of all values, oldest first.
    pub fn entries(&self) -> Vec<DecodedValue> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn last(&self) -> Option<DecodedValue> {
        self.lock().last().cloned()
    }
}

impl ResultSink for ScanLog {
    fn on_event(&self, event: &SessionEvent) {
        if let SessionEvent::Scanned(value) = event {
            self.lock().push(value.clone());
        }
    }
}

// ----------------------------------------------------------------------------
// EventRecorder
// ----------------------------------------------------------------------------

/// Records every event and lets callers wait for them.
#[derive(Clone, Default)]
pub struct EventRecorder {
    inner: Arc<(Mutex<Vec<SessionEvent>>, Condvar)>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        let (events, _) = &*self.inner;
        events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Wait until at least `count` events arrived or `timeout` elapsed.
    /// Returns whatever was recorded.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SessionEvent> {
        let (events, cond) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = events.lock().unwrap_or_else(|e| e.into_inner());
        while guard.len() < count {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = match cond.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        guard.clone()
    }
}

impl ResultSink for EventRecorder {
    fn on_event(&self, event: &SessionEvent) {
        let (events, cond) = &*self.inner;
        events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        cond.notify_all();
    }
}

// ----------------------------------------------------------------------------
// ChannelSink
// ----------------------------------------------------------------------------

/// Forwards events into an `mpsc` channel. Send errors are ignored.
pub struct ChannelSink {
    tx: Mutex<Sender<SessionEvent>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ResultSink for ChannelSink {
    fn on_event(&self, event: &SessionEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn scanned(value: &str) -> SessionEvent {
        SessionEvent::Scanned(DecodedValue::new(value).unwrap())
    }

    #[test]
    fn scan_log_keeps_only_scanned_values() {
        let log = ScanLog::new();
        log.on_event(&SessionEvent::Started);
        log.on_event(&scanned("PAT-1"));
        log.on_event(&SessionEvent::Stopped);
        log.on_event(&scanned("PAT-2"));

        let entries: Vec<String> = log.entries().into_iter().map(String::from).collect();
        assert_eq!(entries, vec!["PAT-1", "PAT-2"]);
        assert_eq!(log.last().unwrap(), "PAT-2");
    }

    #[test]
    fn recorder_wait_returns_after_timeout() {
        let recorder = EventRecorder::new();
        recorder.on_event(&SessionEvent::Started);

        let events = recorder.wait_for(2, Duration::from_millis(20));
        assert_eq!(events, vec![SessionEvent::Started]);
    }

    #[test]
    fn pair_sink_fans_out_in_order() {
        let log = ScanLog::new();
        let recorder = EventRecorder::new();
        let sink = (log.clone(), recorder.clone());

        sink.on_event(&scanned("PAT-9"));

        assert_eq!(log.len(), 1);
        assert_eq!(recorder.events(), vec![scanned("PAT-9")]);
    }

    #[test]
    fn channel_and_closure_sinks_forward_events() {
        let (tx, rx) = mpsc::channel();
        ChannelSink::new(tx).on_event(&SessionEvent::Stopped);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Stopped);

        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let closure = move |_: &SessionEvent| *counter.lock().unwrap() += 1;
        closure.on_event(&SessionEvent::Started);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
