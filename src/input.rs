use std::{
    io::{self, BufRead, BufReader},
    thread,
};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

/// Line input read on a dedicated OS thread, so awaiting a line never stalls
/// the scheduler and runtime shutdown never waits on a blocked read.
pub struct InputReader {
    lines: UnboundedReceiver<String>,
}

impl InputReader {
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(BufReader::new(io::stdin()))
    }

    pub fn spawn<R: BufRead + Send + 'static>(source: R) -> io::Result<Self> {
        let (tx, lines) = unbounded_channel();
        thread::Builder::new()
            .name("input-reader".into())
            .spawn(move || forward(source, tx))?;
        Ok(Self { lines })
    }

    /// A reader fed by hand; it ends once the sender is dropped.
    pub fn channel() -> (UnboundedSender<String>, Self) {
        let (tx, lines) = unbounded_channel();
        (tx, Self { lines })
    }

    /// The next line without its terminator, or `None` at end of input.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}

fn forward<R: BufRead>(source: R, tx: UnboundedSender<String>) {
    for line in source.lines() {
        match line {
            Ok(line) => {
                if tx.send(line.trim_end_matches('\r').to_string()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "stopped reading input");
                break;
            }
        }
    }
}
