use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;
use crate::signal::{CancelSignal, ReadyHandshake};
use crate::Item;
use crossbeam::channel::{self, select, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Join handle of a spawned stage thread
pub type StageHandle = JoinHandle<Result<()>>;

/// Trait for a processing stage in the pipeline
pub trait Stage: Send + 'static {
    /// Process an input item. Returning `None` drops it.
    fn process(&mut self, input: Item) -> Option<Item>;

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Runs a stage by receiving from the input channel, processing, and sending to the output
pub struct StageRunner {
    input: Receiver<Item>,
    output: Sender<Item>,
    cancel: CancelSignal,
    ready: ReadyHandshake,
    metrics: StageMetrics,
}

impl StageRunner {
    /// Create a new stage runner
    pub fn new(
        input: Receiver<Item>,
        output: Sender<Item>,
        cancel: CancelSignal,
        ready: ReadyHandshake,
        metrics: StageMetrics,
    ) -> Self {
        Self {
            input,
            output,
            cancel,
            ready,
            metrics,
        }
    }

    /// Run the stage with the provided implementation.
    ///
    /// Blocks until cancellation, until the input closes, or until the
    /// downstream receiver goes away. The output closes when the runner drops.
    pub fn run(&mut self, mut stage: Box<dyn Stage>) -> Result<()> {
        let name = stage.name().to_string();
        debug!(stage = %name, "stage started");

        loop {
            let received = select! {
                recv(self.input) -> msg => msg.ok(),
                recv(self.cancel.receiver()) -> _ => None,
            };
            let Some(item) = received else {
                break;
            };
            self.metrics.record_received();

            match stage.process(item) {
                Some(output) => {
                    debug!(stage = %name, value = item, "passed");
                    if !forward(&self.output, output, &self.cancel) {
                        break;
                    }
                    self.metrics.record_forwarded();
                }
                None => {
                    debug!(stage = %name, value = item, "filtered out");
                    self.metrics.record_rejected();
                    // The item ends here, so the source may ask for another
                    self.ready.release();
                }
            }
        }

        debug!(stage = %name, "stage stopped");
        Ok(())
    }
}

/// Send `item` downstream unless cancellation arrives first.
///
/// Returns `false` when the stage should stop.
pub(crate) fn forward(output: &Sender<Item>, item: Item, cancel: &CancelSignal) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    select! {
        send(output, item) -> sent => sent.is_ok(),
        recv(cancel.receiver()) -> _ => false,
    }
}

/// Spawn `stage` on its own thread and return its output channel right away
pub fn spawn_stage(
    stage: Box<dyn Stage>,
    input: Receiver<Item>,
    cancel: &CancelSignal,
    ready: &ReadyHandshake,
    metrics: StageMetrics,
) -> Result<(Receiver<Item>, StageHandle)> {
    let (output, receiver) = channel::bounded(0);
    let thread_name = format!("stage-{}", stage.name());
    let mut runner = StageRunner::new(input, output, cancel.clone(), ready.clone(), metrics);

    let handle = thread::Builder::new()
        .name(thread_name)
        .spawn(move || runner.run(stage))
        .map_err(|e| PipelineError::ThreadError(format!("failed to spawn stage: {e}")))?;

    Ok((receiver, handle))
}

/// Forwards only values that are zero or positive
pub fn is_non_negative(value: Item) -> bool {
    value >= 0
}

/// Forwards non-zero multiples of three. Zero never passes.
pub fn is_multiple_of_three(value: Item) -> bool {
    value != 0 && value % 3 == 0
}

/// A filtering stage that passes through items matching a predicate
#[derive(Debug)]
pub struct FilterStage<F>
where
    F: Fn(Item) -> bool + Send + 'static,
{
    name: String,
    predicate: F,
}

impl<F> FilterStage<F>
where
    F: Fn(Item) -> bool + Send + 'static,
{
    /// Create a new filter stage
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl FilterStage<fn(Item) -> bool> {
    /// Stage that drops negative values
    pub fn non_negative() -> Self {
        Self::new("non_negative", is_non_negative)
    }

    /// Stage that drops everything but non-zero multiples of three
    pub fn multiple_of_three() -> Self {
        Self::new("multiple_of_three", is_multiple_of_three)
    }
}

impl<F> Stage for FilterStage<F>
where
    F: Fn(Item) -> bool + Send + 'static,
{
    fn process(&mut self, input: Item) -> Option<Item> {
        if (self.predicate)(input) {
            Some(input)
        } else {
            None
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
