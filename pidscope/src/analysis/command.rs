//! Analyzer backed by an external program.
//!
//! The program receives the `LoopModel` as JSON on stdin and must print a
//! `StabilityReport` as JSON on stdout, then exit with status 0. Anything it
//! writes to stderr is passed along in the error when it fails.

use super::{AnalysisError, LoopModel, StabilityAnalyzer, StabilityReport};
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    /// `argv[0]` is the program, the rest its arguments.
    pub fn new(argv: &[String]) -> Result<CommandAnalyzer, AnalysisError> {
        let (program, args) = argv.split_first().ok_or(AnalysisError::NotConfigured)?;
        if program.trim().is_empty() {
            return Err(AnalysisError::NotConfigured);
        }
        Ok(CommandAnalyzer {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl StabilityAnalyzer for CommandAnalyzer {
    fn analyze(&self, model: &LoopModel) -> Result<StabilityReport, AnalysisError> {
        let input = serde_json::to_vec(model)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AnalysisError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores its input may exit before reading it.
            if let Err(e) = stdin.write_all(&input) {
                tracing::debug!("analyzer did not take its input: {}", e);
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(AnalysisError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
