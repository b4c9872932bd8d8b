//! Output stream capability.

use super::StreamId;
use crate::error::{Error, Result};
use crate::temporal::{StreamEvent, Timestamp};

/// Callback invoked for every event sent on a [`Stream`].
pub type StreamHandler<T> = Box<dyn FnMut(StreamEvent<T>) -> Result<()> + Send>;

/// An output stream that delivers events to explicit subscribers.
///
/// Subscribers are called synchronously, in subscription order, for every
/// event. The stream enforces its own ordering contract: data is never sent
/// at or below the last watermark, and watermarks never move backwards.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use tracksync::stream::Stream;
/// use tracksync::temporal::StreamEvent;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let mut stream: Stream<u32> = Stream::new("numbers");
///
/// let sink = seen.clone();
/// stream.subscribe(move |event| {
///     sink.lock().unwrap().push(event);
///     Ok(())
/// });
///
/// stream.send(StreamEvent::data(1, 7)).unwrap();
/// stream.send(StreamEvent::watermark(1)).unwrap();
/// assert_eq!(seen.lock().unwrap().len(), 2);
/// ```
pub struct Stream<T> {
    id: StreamId,
    subscribers: Vec<StreamHandler<T>>,
    watermark: Option<Timestamp>,
    sent: u64,
}

impl<T: Clone> Stream<T> {
    /// Create a stream with no subscribers.
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            subscribers: Vec::new(),
            watermark: None,
            sent: 0,
        }
    }

    /// Register a handler for every future event.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(StreamEvent<T>) -> Result<()> + Send + 'static,
    {
        self.subscribers.push(Box::new(handler));
    }

    /// Send an event to all subscribers.
    ///
    /// Every subscriber sees the event even if an earlier one fails; the
    /// first subscriber error is returned once all have been called.
    pub fn send(&mut self, event: StreamEvent<T>) -> Result<()> {
        self.check_order(&event)?;
        if let StreamEvent::Watermark(wm) = &event {
            self.watermark = Some(wm.timestamp().clone());
        }
        self.sent += 1;

        let mut first_err = None;
        if let Some((last, rest)) = self.subscribers.split_last_mut() {
            for handler in rest {
                if let Err(err) = handler(event.clone()) {
                    first_err.get_or_insert(err);
                }
            }
            if let Err(err) = last(event) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => {
                tracing::warn!(stream = %self.id, error = %err, "subscriber failed");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn check_order(&self, event: &StreamEvent<T>) -> Result<()> {
        let Some(watermark) = &self.watermark else {
            return Ok(());
        };
        match event {
            StreamEvent::Data(msg) if msg.timestamp() <= watermark => Err(Error::LateMessage {
                stream: self.id.clone(),
                timestamp: msg.timestamp().clone(),
                watermark: watermark.clone(),
            }),
            StreamEvent::Watermark(wm) if wm.timestamp() < watermark => {
                Err(Error::WatermarkRegression {
                    stream: self.id.clone(),
                    watermark: wm.timestamp().clone(),
                    previous: watermark.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl<T> Stream<T> {
    /// The stream id.
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Last watermark sent.
    pub fn watermark(&self) -> Option<&Timestamp> {
        self.watermark.as_ref()
    }

    /// Number of events sent.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("subscribers", &self.subscribers.len())
            .field("watermark", &self.watermark)
            .field("sent", &self.sent)
            .finish()
    }
}
