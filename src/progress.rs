//! Hashing progress reporting.

use std::io::Write;

/// Receives progress updates while a data path is hashed.
///
/// Calls are made synchronously from the hashing loop, so implementations
/// should return quickly.
pub trait Progress {
    /// Called once before hashing with the total number of bytes.
    fn start(&mut self, _total: u64) {}

    /// Called after each read with the number of bytes just hashed.
    fn advance(&mut self, bytes: u64);

    /// Called once after the last piece has been hashed.
    fn finish(&mut self) {}
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&mut self, _bytes: u64) {}
}

/// Renders a percentage on stderr, redrawing only when the whole percent changes.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    total: u64,
    done: u64,
    shown: Option<u64>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn percent(&self) -> u64 {
        if self.total == 0 {
            100
        } else {
            self.done.saturating_mul(100) / self.total
        }
    }
}

impl Progress for ConsoleProgress {
    fn start(&mut self, total: u64) {
        self.total = total;
        self.done = 0;
        self.shown = None;
    }

    fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes).min(self.total);
        let percent = self.percent();
        if self.shown != Some(percent) {
            self.shown = Some(percent);
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\rHashing... {:3}%", percent);
            let _ = stderr.flush();
        }
    }

    fn finish(&mut self) {
        if self.shown.is_some() {
            let _ = writeln!(std::io::stderr());
        }
    }
}
