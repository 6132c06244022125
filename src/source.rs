//! Line-oriented console source.
//!
//! Waits for a ready token, prompts, reads one line and either forwards the
//! parsed integer, re-prompts on bad input, or stops on the exit keyword.
//! Whatever ends the source also closes the pipeline's cancel signal.

use crate::error::{PipelineError, Result};
use crate::signal::{CancelSignal, ReadyHandshake};
use crate::stage::{forward, StageHandle};
use crate::Item;
use crossbeam::channel::{self, Receiver, Sender};
use std::io::{BufRead, Write};
use std::thread;
use tracing::{debug, info, warn};

/// What a single line of console input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The exit keyword
    Exit,
    /// A decimal integer to forward
    Value(Item),
    /// Anything else, trimmed
    Invalid(String),
}

/// Classify one line of input. Surrounding whitespace is ignored and the
/// exit keyword matches case-insensitively.
pub fn parse_command(line: &str, exit_keyword: &str) -> Command {
    let text = line.trim();
    if text.eq_ignore_ascii_case(exit_keyword.trim()) {
        return Command::Exit;
    }
    match text.parse::<Item>() {
        Ok(value) => Command::Value(value),
        Err(_) => Command::Invalid(text.to_string()),
    }
}

/// Reads integers from `reader`, writing prompts to `writer`
pub struct ConsoleSource<R, W> {
    reader: R,
    writer: W,
    exit_keyword: String,
}

impl<R, W> ConsoleSource<R, W>
where
    R: BufRead,
    W: Write,
{
    /// Create a new console source
    pub fn new(reader: R, writer: W, exit_keyword: impl Into<String>) -> Self {
        Self {
            reader,
            writer,
            exit_keyword: exit_keyword.into(),
        }
    }

    /// Run until the exit keyword, end of input, an I/O error or cancellation.
    ///
    /// Closes `cancel` before returning.
    pub fn run(
        &mut self,
        output: &Sender<Item>,
        cancel: &CancelSignal,
        ready: &ReadyHandshake,
    ) -> Result<()> {
        let result = self.drive(output, cancel, ready);
        if cancel.cancel() {
            info!("source finished, cancelling pipeline");
        }
        result
    }

    fn drive(
        &mut self,
        output: &Sender<Item>,
        cancel: &CancelSignal,
        ready: &ReadyHandshake,
    ) -> Result<()> {
        let mut line = String::new();
        loop {
            if !ready.wait(cancel) {
                debug!("source cancelled while waiting for ready token");
                return Ok(());
            }

            writeln!(self.writer, "Enter a number, or '{}' to quit:", self.exit_keyword)?;
            self.writer.flush()?;

            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                info!("input closed");
                return Ok(());
            }

            match parse_command(&line, &self.exit_keyword) {
                Command::Exit => {
                    info!("exit keyword received");
                    writeln!(self.writer, "Shutting down...")?;
                    self.writer.flush()?;
                    return Ok(());
                }
                Command::Invalid(text) => {
                    warn!(input = %text, "not an integer, prompting again");
                    writeln!(self.writer, "Error: '{text}' is not a number")?;
                    // We just took the only token, so this keeps at most one pending
                    ready.release();
                }
                Command::Value(value) => {
                    debug!(value, "read value");
                    // Still holding this prompt's permit, so any pending token
                    // is a late release for an earlier value
                    if ready.clear() {
                        debug!("discarded surplus ready token");
                    }
                    if !forward(output, value, cancel) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Spawn `source` on its own thread and return its output channel right away
pub fn spawn<R, W>(
    mut source: ConsoleSource<R, W>,
    cancel: &CancelSignal,
    ready: &ReadyHandshake,
) -> Result<(Receiver<Item>, StageHandle)>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let (output, receiver) = channel::bounded(0);
    let cancel = cancel.clone();
    let ready = ready.clone();

    let handle = thread::Builder::new()
        .name("source".into())
        .spawn(move || source.run(&output, &cancel, &ready))
        .map_err(|e| PipelineError::ThreadError(format!("failed to spawn source: {e}")))?;

    Ok((receiver, handle))
}
