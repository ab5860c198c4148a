//! Metric sinks.
//!
//! The trainer reports named scalars (`loss/kld`, `stats/alpha`,
//! `return/test`, ...) against a step counter. Sinks decide where they go.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Metric name of the mean evaluation return.
pub const EVAL_RETURN: &str = "return/test";

/// Destination for named scalars.
pub trait MetricsSink {
    /// Record `value` for `name` at `step`.
    fn scalar(&mut self, name: &str, value: f32, step: usize);

    /// Flush any buffered output.
    fn flush(&mut self) {}
}

// ============================================================================
// Log
// ============================================================================

/// Emits every scalar as a `log::info!` line.
pub struct LogSink {
    start_time: Instant,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for LogSink {
    fn scalar(&mut self, name: &str, value: f32, step: usize) {
        log::info!(
            "[{:>8.0}s] step {:>8} {:<20} {:>12.6}",
            self.start_time.elapsed().as_secs_f32(),
            step,
            name,
            value
        );
    }
}

// ============================================================================
// CSV
// ============================================================================

/// Writes one metric to a two-column CSV file, ignoring all others.
pub struct CsvSink {
    writer: BufWriter<File>,
    metric: String,
}

impl CsvSink {
    /// Track `metric` under the column header `step,<column>`.
    pub fn new(path: impl AsRef<Path>, metric: &str, column: &str) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "step,{}", column)?;
        writer.flush()?;

        Ok(Self {
            writer,
            metric: metric.to_string(),
        })
    }

    /// Evaluation log: `step,return` rows of [`EVAL_RETURN`].
    pub fn evaluation(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::new(path, EVAL_RETURN, "return")
    }
}

impl MetricsSink for CsvSink {
    fn scalar(&mut self, name: &str, value: f32, step: usize) {
        if name != self.metric {
            return;
        }
        // Rows are rare (one per evaluation), so flush each one.
        let written = writeln!(self.writer, "{},{}", step, value).and_then(|_| self.writer.flush());
        if let Err(err) = written {
            log::warn!("failed to write {} row: {}", self.metric, err);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.flush();
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Keeps every scalar in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<(String, usize, f32)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step, value)` pairs recorded for `name`, in arrival order.
    pub fn series(&self, name: &str) -> Vec<(usize, f32)> {
        self.records
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|&(_, step, value)| (step, value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn scalar(&mut self, name: &str, value: f32, step: usize) {
        self.records.push((name.to_string(), step, value));
    }
}

/// Shared handle so a caller can inspect what the trainer recorded.
impl MetricsSink for std::rc::Rc<std::cell::RefCell<MemorySink>> {
    fn scalar(&mut self, name: &str, value: f32, step: usize) {
        self.borrow_mut().scalar(name, value, step);
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Writes to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl MetricsSink for MultiSink {
    fn scalar(&mut self, name: &str, value: f32, step: usize) {
        for sink in &mut self.sinks {
            sink.scalar(name, value, step);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[test]
    fn test_csv_sink_keeps_only_its_metric() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let mut sink = CsvSink::evaluation(&path).unwrap();
            sink.scalar("loss/kld", 1.0, 10);
            sink.scalar(EVAL_RETURN, -3.5, 1000);
            sink.scalar(EVAL_RETURN, -1.25, 2000);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "step,return\n1000,-3.5\n2000,-1.25\n");
    }

    #[test]
    fn test_memory_sink_series() {
        let mut sink = MemorySink::new();
        sink.scalar("loss/image", 3.0, 1);
        sink.scalar("loss/kld", 0.5, 1);
        sink.scalar("loss/image", 2.0, 2);

        assert_eq!(sink.series("loss/image"), vec![(1, 3.0), (2, 2.0)]);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let shared = Rc::new(RefCell::new(MemorySink::new()));
        let mut multi = MultiSink::new().add(LogSink::new()).add(shared.clone());

        multi.scalar("stats/alpha", 0.9, 7);
        multi.flush();

        assert_eq!(shared.borrow().series("stats/alpha"), vec![(7, 0.9)]);
    }
}
