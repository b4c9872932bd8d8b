//! Ordered publication of per-tick output.

use super::handle::Stream;
use crate::error::{Error, Result};
use crate::temporal::{StreamEvent, Timestamp};

/// Publishes the output of one tick on a [`Stream`].
///
/// For every tick the emitter sends all data messages first and the
/// watermark for that tick last. Downstream coordinators rely on this to
/// know that a tick's data is complete, so ticks must also be emitted in
/// strictly increasing order.
#[derive(Debug)]
pub struct Emitter<T> {
    stream: Stream<T>,
    last_emitted: Option<Timestamp>,
}

impl<T: Clone> Emitter<T> {
    /// Create an emitter that owns a fresh output stream.
    pub fn new(stream: Stream<T>) -> Self {
        Self {
            stream,
            last_emitted: None,
        }
    }

    /// Send the data for `timestamp`, then `Watermark(timestamp)`.
    pub fn emit<I>(&mut self, timestamp: &Timestamp, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        self.check_next(timestamp)?;
        for payload in payloads {
            self.stream
                .send(StreamEvent::data(timestamp.clone(), payload))?;
        }
        self.stream.send(StreamEvent::watermark(timestamp.clone()))?;
        self.last_emitted = Some(timestamp.clone());
        Ok(())
    }

    /// Send one payload for `timestamp`, then its watermark.
    pub fn emit_one(&mut self, timestamp: &Timestamp, payload: T) -> Result<()> {
        self.emit(timestamp, std::iter::once(payload))
    }

    /// Propagate a watermark for a tick with no output data.
    pub fn emit_watermark(&mut self, timestamp: &Timestamp) -> Result<()> {
        self.emit(timestamp, std::iter::empty())
    }

    fn check_next(&self, timestamp: &Timestamp) -> Result<()> {
        match &self.last_emitted {
            Some(last) if timestamp <= last => Err(Error::EmitOrder {
                timestamp: timestamp.clone(),
                last: last.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Mutable access to the output stream, e.g. to subscribe.
    pub fn stream_mut(&mut self) -> &mut Stream<T> {
        &mut self.stream
    }
}

impl<T> Emitter<T> {
    /// The output stream.
    pub fn stream(&self) -> &Stream<T> {
        &self.stream
    }

    /// The last tick emitted.
    pub fn last_emitted(&self) -> Option<&Timestamp> {
        self.last_emitted.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorded_emitter() -> (Emitter<&'static str>, Arc<Mutex<Vec<StreamEvent<&'static str>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut emitter = Emitter::new(Stream::new("out"));
        emitter.stream_mut().subscribe(move |event| {
            sink.lock().unwrap().push(event);
            Ok(())
        });
        (emitter, seen)
    }

    #[test]
    fn test_data_precedes_watermark() {
        let (mut emitter, seen) = recorded_emitter();
        emitter.emit(&Timestamp::from(1), ["a", "b"]).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                StreamEvent::data(1, "a"),
                StreamEvent::data(1, "b"),
                StreamEvent::watermark(1),
            ]
        );
    }

    #[test]
    fn test_ticks_strictly_increasing() {
        let (mut emitter, _seen) = recorded_emitter();
        emitter.emit_one(&Timestamp::from(2), "x").unwrap();

        assert!(matches!(
            emitter.emit_one(&Timestamp::from(2), "y"),
            Err(Error::EmitOrder { .. })
        ));
        assert!(matches!(
            emitter.emit_watermark(&Timestamp::from(1)),
            Err(Error::EmitOrder { .. })
        ));
        emitter.emit_watermark(&Timestamp::from(3)).unwrap();
        assert_eq!(emitter.last_emitted(), Some(&Timestamp::from(3)));
    }
}
