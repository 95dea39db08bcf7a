//! Terminal confirmation for reprocessing runs.

use std::io::{BufRead, BufReader, Stdin, Stdout, Write};

use crate::executor::manifest::FailedPath;
use crate::executor::reprocess::{Confirm, Decision, ManifestSummary};

/// Asks on a line-oriented terminal: 1 lists the files, 2 proceeds, 3 cancels.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, summary: &ManifestSummary) -> std::io::Result<Decision> {
        writeln!(
            self.output,
            "\nThe manifest from {} lists {} files that were not stored in bucket {}.",
            summary.date_created.format("%Y-%m-%d %H:%M:%S UTC"),
            summary.failed,
            summary.bucket
        )?;

        loop {
            write!(
                self.output,
                "Enter 1 to list the files, 2 to reprocess them, 3 to cancel: "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                // end of input
                return Ok(Decision::Cancel);
            }
            match line.trim() {
                "1" => return Ok(Decision::List),
                "2" => return Ok(Decision::Proceed),
                "3" => return Ok(Decision::Cancel),
                other => writeln!(self.output, "Unrecognised choice: {:?}", other)?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalPrompt<R, W> {
    fn decide(&mut self, summary: &ManifestSummary) -> Decision {
        match self.ask(summary) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("Unable to read a choice from the terminal: {}", e);
                Decision::Cancel
            }
        }
    }

    fn list(&mut self, entries: &[FailedPath]) {
        for entry in entries {
            if let Err(e) = writeln!(self.output, "{}", entry.full_name.display()) {
                tracing::warn!("Unable to write to the terminal: {}", e);
                return;
            }
        }
    }
}
