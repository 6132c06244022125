use crate::buffer_stage::BufferStage;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::signal::{CancelSignal, ReadyHandshake};
use crate::stage::{spawn_stage, FilterStage, Stage, StageHandle};
use crate::Item;
use crossbeam::channel::{select, Receiver};
use std::time::Duration;
use tracing::{debug, info};

/// Builder for constructing pipelines
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Create a new pipeline builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ring buffer capacity of the buffering stage
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set the period between buffer flushes
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let ready = ReadyHandshake::new();
        // The source may prompt for the very first value straight away
        ready.release();

        Ok(Pipeline {
            config: self.config,
            cancel: CancelSignal::new(),
            ready,
        })
    }
}

/// A configured pipeline that has not been started yet.
///
/// Hand [`cancel_signal`](Pipeline::cancel_signal) and
/// [`ready_handshake`](Pipeline::ready_handshake) to the source before
/// calling [`start`](Pipeline::start).
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    cancel: CancelSignal,
    ready: ReadyHandshake,
}

impl Pipeline {
    /// Get the validated configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the cancel signal shared by every stage and the source
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Get the ready handshake between the consumer and the source
    pub fn ready_handshake(&self) -> &ReadyHandshake {
        &self.ready
    }

    /// Wire source → non_negative → multiple_of_three → buffer and spawn every stage
    pub fn start(self, source: Receiver<Item>) -> Result<RunningPipeline> {
        let mut running = RunningPipeline {
            cancel: self.cancel.clone(),
            ready: self.ready.clone(),
            output: None,
            handles: Vec::new(),
            metrics: Vec::new(),
            consumer_metrics: StageMetrics::new(),
        };

        // Stop whatever already started if a later spawn fails
        if let Err(e) = running.spawn_stages(&self.config, source) {
            running.cancel.cancel();
            let _ = running.join_all();
            return Err(e);
        }

        info!(
            capacity = self.config.buffer_capacity,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "pipeline started"
        );
        Ok(running)
    }
}

/// A running pipeline that can be consumed, controlled and monitored
pub struct RunningPipeline {
    cancel: CancelSignal,
    ready: ReadyHandshake,
    output: Option<Receiver<Item>>,
    handles: Vec<(String, StageHandle)>,
    metrics: Vec<(String, StageMetrics)>,
    consumer_metrics: StageMetrics,
}

impl RunningPipeline {
    fn spawn_stages(&mut self, config: &PipelineConfig, source: Receiver<Item>) -> Result<()> {
        let mut input = source;

        for stage in [FilterStage::non_negative(), FilterStage::multiple_of_three()] {
            let name = stage.name().to_string();
            let metrics = StageMetrics::new();
            let (output, handle) =
                spawn_stage(Box::new(stage), input, &self.cancel, &self.ready, metrics.clone())?;
            self.handles.push((name.clone(), handle));
            self.metrics.push((name, metrics));
            input = output;
        }

        let metrics = StageMetrics::new();
        let buffer = BufferStage::new(config.buffer_capacity, config.flush_interval, metrics.clone());
        self.metrics.push(("buffer".to_string(), metrics));
        let output = buffer.spawn(input, &self.cancel, &self.ready, &mut self.handles)?;
        self.output = Some(output);
        Ok(())
    }

    /// Create the consumer draining the final stage.
    ///
    /// Returns `None` if the consumer was already taken.
    pub fn consumer(&mut self) -> Option<Consumer> {
        let input = self.output.take()?;
        Some(Consumer {
            input,
            cancel: self.cancel.clone(),
            ready: self.ready.clone(),
            metrics: self.consumer_metrics.clone(),
        })
    }

    /// Get the cancel signal shared by every stage
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Get metrics for a stage by name
    pub fn stage_metrics(&self, name: &str) -> Option<&StageMetrics> {
        self.metrics
            .iter()
            .find(|(stage, _)| stage == name)
            .map(|(_, metrics)| metrics)
    }

    /// Get a summary of all metrics
    pub fn metrics_summary(&self) -> String {
        let mut summary = String::from("Pipeline Metrics Summary:\n");
        for (name, metrics) in &self.metrics {
            summary.push_str(&format!("  {}: {}\n", name, metrics.snapshot().format()));
        }
        summary.push_str(&format!(
            "  consumer: {}\n",
            self.consumer_metrics.snapshot().format()
        ));
        summary
    }

    /// Wait for every stage to finish. Blocks until the pipeline is cancelled.
    pub fn wait(mut self) -> Result<()> {
        self.join_all()
    }

    /// Cancel the pipeline and wait for every stage to finish
    pub fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        self.join_all()
    }

    fn join_all(&mut self) -> Result<()> {
        // Release the final output so nothing can block on it
        self.output = None;

        // Join every thread before reporting, so none is left detached
        let mut first_error = None;
        for (name, handle) in self.handles.drain(..) {
            let result = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::ThreadError(format!("stage {name} panicked"))),
            };
            debug!(stage = %name, "joined");
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Drains the final stage and hands the source a ready token per item
pub struct Consumer {
    input: Receiver<Item>,
    cancel: CancelSignal,
    ready: ReadyHandshake,
    metrics: StageMetrics,
}

impl Consumer {
    /// Pass every item to `sink` until cancellation or end-of-stream
    pub fn run<F>(self, mut sink: F)
    where
        F: FnMut(Item),
    {
        loop {
            let received = select! {
                recv(self.input) -> msg => msg.ok(),
                recv(self.cancel.receiver()) -> _ => None,
            };
            let Some(item) = received else {
                break;
            };

            info!(value = item, "processed");
            self.metrics.record_received();
            sink(item);
            self.metrics.record_forwarded();
            self.ready.release();
        }
        debug!("consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pipeline_builder() {
        let result = PipelineBuilder::new()
            .buffer_capacity(4)
            .flush_interval(Duration::from_millis(50))
            .build();
        assert!(result.is_ok());
        let pipeline = result.unwrap();
        assert_eq!(pipeline.config().buffer_capacity, 4);
        assert!(pipeline.ready_handshake().is_pending());
        assert!(!pipeline.cancel_signal().is_cancelled());
    }

    #[test]
    fn test_invalid_config_error() {
        let result = PipelineBuilder::new().buffer_capacity(0).build();
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_consumer_taken_once() {
        let (_tx, rx) = channel::bounded::<Item>(0);
        let mut running = PipelineBuilder::new().build().unwrap().start(rx).unwrap();
        assert!(running.consumer().is_some());
        assert!(running.consumer().is_none());
        running.shutdown().unwrap();
    }

    #[test]
    fn test_metrics_summary_lists_stages() {
        let (_tx, rx) = channel::bounded::<Item>(0);
        let running = PipelineBuilder::new().build().unwrap().start(rx).unwrap();
        let summary = running.metrics_summary();
        for name in ["non_negative", "multiple_of_three", "buffer", "consumer"] {
            assert!(summary.contains(name), "missing {name}");
        }
        assert!(running.stage_metrics("buffer").is_some());
        assert!(running.stage_metrics("missing").is_none());
        running.shutdown().unwrap();
    }

    #[test]
    fn test_consumer_releases_one_token_per_item() {
        let cancel = CancelSignal::new();
        let ready = ReadyHandshake::new();
        let metrics = StageMetrics::new();
        let (tx, rx) = channel::bounded(0);

        let consumer = Consumer {
            input: rx,
            cancel: cancel.clone(),
            ready: ready.clone(),
            metrics: metrics.clone(),
        };
        let (seen_tx, seen) = channel::unbounded();
        let worker = thread::spawn(move || consumer.run(|value| seen_tx.send(value).unwrap()));

        for value in [3, 6] {
            assert!(!ready.is_pending());
            tx.send(value).unwrap();
            assert_eq!(seen.recv_timeout(Duration::from_secs(1)).unwrap(), value);
            assert!(ready.wait(&cancel));
            // Exactly one token for this item
            thread::sleep(Duration::from_millis(20));
            assert!(!ready.is_pending());
        }

        cancel.cancel();
        worker.join().unwrap();
        assert!(!ready.is_pending());
        assert_eq!(metrics.total_received(), 2);

        // Nobody is left to receive or release after cancellation
        assert!(tx.send(9).is_err());
        assert!(!ready.is_pending());
    }

    #[test]
    fn test_join_all_joins_every_stage_after_a_panic() {
        let finished = Arc::new(AtomicBool::new(false));
        let slow: StageHandle = {
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let panicking: StageHandle = thread::spawn(|| panic!("stage failure"));

        let running = RunningPipeline {
            cancel: CancelSignal::new(),
            ready: ReadyHandshake::new(),
            output: None,
            handles: vec![("broken".to_string(), panicking), ("slow".to_string(), slow)],
            metrics: Vec::new(),
            consumer_metrics: StageMetrics::new(),
        };

        let result = running.wait();
        assert!(matches!(result, Err(PipelineError::ThreadError(msg)) if msg.contains("broken")));
        assert!(finished.load(Ordering::SeqCst));
    }
}
