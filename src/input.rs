//! Text input adapter: turns whitespace-separated tokens into pipeline values.

use crate::channel::Value;
use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineInput;
use std::io::{BufRead, Write};

/// Command that stops the pipeline, matched case-insensitively
pub const EXIT_COMMAND: &str = "exit";

/// One parsed input token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Value(Value),
    Exit,
}

/// Parse a single token
pub fn parse_token(token: &str) -> Result<Token> {
    if token.eq_ignore_ascii_case(EXIT_COMMAND) {
        return Ok(Token::Exit);
    }
    token
        .parse::<Value>()
        .map(Token::Value)
        .map_err(|_| PipelineError::InvalidToken(token.to_string()))
}

/// Why the reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The exit command fired the shutdown signal
    Exit,
    /// Input ended; the source was closed so the pipeline drains on its own
    EndOfInput,
    /// The pipeline stopped accepting values
    PipelineStopped,
}

/// Reads tokens from `reader`, feeds integers into the pipeline and reports
/// rejected tokens on `notices`
pub struct ConsoleReader<R: BufRead, W: Write> {
    reader: R,
    notices: W,
}

impl<R: BufRead, W: Write> ConsoleReader<R, W> {
    pub fn new(reader: R, notices: W) -> Self {
        Self { reader, notices }
    }

    /// Consume input until exit, end of input, or pipeline shutdown
    pub fn run(mut self, input: PipelineInput) -> Result<ReadOutcome> {
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if self.reader.read_until(b'\n', &mut raw)? == 0 {
                tracing::info!("input ended, closing pipeline source");
                input.close();
                return Ok(ReadOutcome::EndOfInput);
            }

            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(_) => {
                    let lossy = String::from_utf8_lossy(&raw).trim().to_string();
                    tracing::warn!(line = %lossy, "rejected input line that is not UTF-8");
                    writeln!(self.notices, "{}", PipelineError::InvalidToken(lossy))?;
                    continue;
                }
            };

            for token in line.split_whitespace() {
                match parse_token(token) {
                    Ok(Token::Exit) => {
                        writeln!(self.notices, "exit requested, stopping pipeline")?;
                        input.shutdown();
                        return Ok(ReadOutcome::Exit);
                    }
                    Ok(Token::Value(value)) => {
                        if input.send(value).is_err() {
                            tracing::info!(value, "pipeline no longer accepts input");
                            return Ok(ReadOutcome::PipelineStopped);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(token, "rejected input token");
                        writeln!(self.notices, "{e}")?;
                    }
                }
            }
        }
    }
}
