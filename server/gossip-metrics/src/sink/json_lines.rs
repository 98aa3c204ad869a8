//! One JSON object per record, written to any `io::Write`.

use std::io::{self, BufWriter, Write};

use super::MetricSink;
use crate::error::SinkError;
use crate::types::MetricRecord;

pub struct JsonLinesSink<W: Write> {
  out: W,
}

impl JsonLinesSink<BufWriter<io::Stdout>> {
  pub fn stdout() -> Self {
    Self::new(BufWriter::new(io::stdout()))
  }
}

impl<W: Write> JsonLinesSink<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }
}

impl<W: Write> MetricSink for JsonLinesSink<W> {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    serde_json::to_writer(&mut self.out, &record)?;
    writeln!(self.out)?;
    Ok(())
  }

  fn flush(&mut self) -> Result<(), SinkError> {
    self.out.flush()?;
    Ok(())
  }
}
