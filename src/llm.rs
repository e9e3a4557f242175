//! Text-generation backends for the language-model parsing path.
//!
//! The parser only sees [`TextBackend`]: something that can load a model once
//! and then turn a prompt into free text. [`CommandBackend`] pipes the prompt
//! into an external program (a local model runner, a script wrapping a remote
//! API) and reads the completion from its stdout.

use crate::config::LlmConfig;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No language-model command configured")]
    NotConfigured,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to the model process: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model process exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Model output was not valid UTF-8")]
    InvalidOutput,

    #[error("Prompt writer thread panicked")]
    WriterPanicked,
}

/// Sampling settings forwarded with every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_new_tokens: u32,
}

impl From<&LlmConfig> for Sampling {
    fn from(config: &LlmConfig) -> Self {
        Sampling {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_new_tokens: config.max_new_tokens,
        }
    }
}

/// A model that has been loaded and can generate text.
pub trait LoadedModel {
    fn generate(&mut self, prompt: &str, sampling: &Sampling) -> Result<String, BackendError>;
}

/// Produces a [`LoadedModel`]. Loading may be slow; callers cache the result.
pub trait TextBackend {
    fn load(&self) -> Result<Box<dyn LoadedModel>, BackendError>;
}

pub struct CommandBackend {
    command: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.command.clone())
    }
}

impl TextBackend for CommandBackend {
    fn load(&self) -> Result<Box<dyn LoadedModel>, BackendError> {
        let (program, args) = self.command.split_first().ok_or(BackendError::NotConfigured)?;
        if program.trim().is_empty() {
            return Err(BackendError::NotConfigured);
        }
        info!("Using model command '{}'", self.command.join(" "));
        Ok(Box::new(CommandModel {
            program: program.clone(),
            args: args.to_vec(),
        }))
    }
}

struct CommandModel {
    program: String,
    args: Vec<String>,
}

impl LoadedModel for CommandModel {
    fn generate(&mut self, prompt: &str, sampling: &Sampling) -> Result<String, BackendError> {
        debug!("Running '{}' with a {} byte prompt", self.program, prompt.len());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("SIMLAB_TEMPERATURE", sampling.temperature.to_string())
            .env("SIMLAB_TOP_P", sampling.top_p.to_string())
            .env("SIMLAB_TOP_K", sampling.top_k.to_string())
            .env("SIMLAB_MAX_NEW_TOKENS", sampling.max_new_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // stdout is drained while the prompt is still being written.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_owned();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit without consuming the whole prompt.
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("'{}' closed stdin before reading the whole prompt", self.program);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(BackendError::WriterPanicked),
            }
        }
        if !output.status.success() {
            return Err(BackendError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| BackendError::InvalidOutput)
    }
}
