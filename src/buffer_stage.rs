//! The buffering stage: an event-driven fill loop and a timer-driven flush
//! loop sharing one [`RingBuffer`].

use crate::buffer::RingBuffer;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::signal::{CancelSignal, ReadyHandshake};
use crate::stage::{forward, StageHandle};
use crate::Item;
use crossbeam::channel::{self, select, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

const STAGE_NAME: &str = "buffer";

/// Collects items into a ring buffer and forwards them in batches
#[derive(Debug)]
pub struct BufferStage {
    buffer: RingBuffer<Item>,
    flush_interval: Duration,
    metrics: StageMetrics,
}

impl BufferStage {
    /// Create a buffering stage keeping `capacity` items per flush interval
    pub fn new(capacity: usize, flush_interval: Duration, metrics: StageMetrics) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            flush_interval,
            metrics,
        }
    }

    /// The shared ring buffer
    pub fn buffer(&self) -> &RingBuffer<Item> {
        &self.buffer
    }

    /// Start the fill and flush loops and return the output channel right away.
    ///
    /// Each loop's handle is pushed onto `handles` as soon as it is spawned, so
    /// the caller can still join the fill loop if the flush loop fails to start.
    /// The output closes once both loops have stopped.
    pub fn spawn(
        self,
        input: Receiver<Item>,
        cancel: &CancelSignal,
        ready: &ReadyHandshake,
        handles: &mut Vec<(String, StageHandle)>,
    ) -> Result<Receiver<Item>> {
        let (output, receiver) = channel::bounded(0);

        let fill_name = format!("{STAGE_NAME}-fill");
        let fill = {
            let buffer = self.buffer.clone();
            let cancel = cancel.clone();
            let ready = ready.clone();
            let metrics = self.metrics.clone();
            let output = output.clone();
            thread::Builder::new()
                .name(format!("stage-{fill_name}"))
                .spawn(move || fill_loop(buffer, input, cancel, ready, metrics, output))
                .map_err(|e| PipelineError::ThreadError(format!("failed to spawn fill loop: {e}")))?
        };
        handles.push((fill_name, fill));

        let flush_name = format!("{STAGE_NAME}-flush");
        let flush = {
            let cancel = cancel.clone();
            thread::Builder::new()
                .name(format!("stage-{flush_name}"))
                .spawn(move || {
                    flush_loop(self.buffer, self.flush_interval, output, cancel, self.metrics)
                })
                .map_err(|e| PipelineError::ThreadError(format!("failed to spawn flush loop: {e}")))?
        };
        handles.push((flush_name, flush));

        Ok(receiver)
    }
}

fn fill_loop(
    buffer: RingBuffer<Item>,
    input: Receiver<Item>,
    cancel: CancelSignal,
    ready: ReadyHandshake,
    metrics: StageMetrics,
    // Held so the output stays open until this loop exits too
    _output: Sender<Item>,
) -> Result<()> {
    loop {
        let received = select! {
            recv(input) -> msg => msg.ok(),
            recv(cancel.receiver()) -> _ => None,
        };
        let Some(item) = received else {
            break;
        };
        metrics.record_received();

        match buffer.push(item) {
            Some(evicted) => {
                metrics.record_evicted();
                debug!(stage = STAGE_NAME, value = item, evicted, "buffered, evicted oldest");
            }
            None => debug!(stage = STAGE_NAME, value = item, len = buffer.len(), "buffered"),
        }
        ready.release();
    }

    debug!(stage = STAGE_NAME, "fill loop stopped");
    Ok(())
}

fn flush_loop(
    buffer: RingBuffer<Item>,
    interval: Duration,
    output: Sender<Item>,
    cancel: CancelSignal,
    metrics: StageMetrics,
) -> Result<()> {
    'ticks: loop {
        // Re-armed after each flush completes
        let timer = channel::after(interval);
        let fired = select! {
            recv(timer) -> _ => true,
            recv(cancel.receiver()) -> _ => false,
        };
        if !fired {
            break;
        }

        let Some(batch) = buffer.drain_all() else {
            continue;
        };
        info!(stage = STAGE_NAME, items = ?batch, "flushing buffer");
        metrics.record_flush();

        for item in batch {
            if !forward(&output, item, &cancel) {
                break 'ticks;
            }
            metrics.record_forwarded();
        }
    }

    debug!(stage = STAGE_NAME, "flush loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_flush_emits_buffered_in_order() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let metrics = StageMetrics::new();
        let (tx, rx) = channel::bounded(0);

        let stage = BufferStage::new(10, Duration::from_millis(300), metrics.clone());
        let mut handles = Vec::new();
        let output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        for v in [3, 9, 6] {
            tx.send(v).unwrap();
        }

        let flushed: Vec<Item> = (0..3)
            .map(|_| output.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(flushed, vec![3, 9, 6]);

        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(metrics.total_received(), 3);
        assert_eq!(metrics.total_forwarded(), 3);
        assert_eq!(metrics.total_flushes(), 1);
    }

    #[test]
    fn test_overflow_flushes_last_capacity_items() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let metrics = StageMetrics::new();
        let (tx, rx) = channel::bounded(0);

        let stage = BufferStage::new(10, Duration::from_millis(300), metrics.clone());
        let buffer = stage.buffer().clone();
        let mut handles = Vec::new();
        let output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        for i in 1..=12 {
            tx.send(i * 3).unwrap();
        }

        let flushed: Vec<Item> = (0..10)
            .map(|_| output.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        assert_eq!(flushed, (3..=12).map(|i| i * 3).collect::<Vec<_>>());
        assert_eq!(buffer.evicted_count(), 2);
        assert_eq!(metrics.total_evicted(), 2);

        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn test_empty_tick_emits_nothing() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let metrics = StageMetrics::new();
        let (_tx, rx) = channel::bounded::<Item>(0);

        let stage = BufferStage::new(10, Duration::from_millis(20), metrics.clone());
        let mut handles = Vec::new();
        let output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        assert!(output.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(metrics.total_flushes(), 0);

        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn test_fill_releases_ready_token() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let (tx, rx) = channel::bounded(0);

        let stage = BufferStage::new(10, Duration::from_secs(60), StageMetrics::new());
        let mut handles = Vec::new();
        let _output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        tx.send(3).unwrap();
        assert!(ready.wait(&cancel));

        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn test_cancel_while_flush_blocked_on_send() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let (tx, rx) = channel::bounded(0);

        let stage = BufferStage::new(10, Duration::from_millis(20), StageMetrics::new());
        let mut handles = Vec::new();
        let output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        tx.send(3).unwrap();
        tx.send(6).unwrap();
        // Nobody reads, so the flush loop blocks forwarding
        std::thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        // Both loops are gone, so the output is closed
        assert!(output.recv().is_err());
    }

    #[test]
    fn test_spawn_registers_both_loops_in_order() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let (_tx, rx) = channel::bounded::<Item>(0);

        // Handles already in the list are kept, the loops are appended
        let mut handles: Vec<(String, StageHandle)> =
            vec![("earlier".to_string(), thread::spawn(|| Ok(())))];

        let stage = BufferStage::new(10, Duration::from_secs(60), StageMetrics::new());
        let _output = stage.spawn(rx, &cancel, &ready, &mut handles).unwrap();

        let names: Vec<&str> = handles.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["earlier", "buffer-fill", "buffer-flush"]);

        cancel.cancel();
        for (_, handle) in handles {
            handle.join().unwrap().unwrap();
        }
    }
}
