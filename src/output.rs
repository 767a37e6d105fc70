use crate::channel::Value;
use crate::error::Result;
use std::io::Write;

/// Receives every value the circular buffer emits, one call per emission
pub trait Sink: Send + 'static {
    fn emit(&mut self, value: Value) -> Result<()>;

    /// Called once after the buffer has closed its output
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<F> Sink for F
where
    F: FnMut(Value) + Send + 'static,
{
    fn emit(&mut self, value: Value) -> Result<()> {
        self(value);
        Ok(())
    }
}

/// Human-readable sink writing `received: <value>` lines
pub struct ConsoleSink<W: Write + Send + 'static> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Sink for ConsoleSink<W> {
    fn emit(&mut self, value: Value) -> Result<()> {
        writeln!(self.out, "received: {value}")?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
