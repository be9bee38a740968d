//! Sticker matching through the external matcher process
//!
//! [`Matcher::run`] spawns one process per request ([`invoker`]), races it
//! against the configured timeout ([`guard`]) and interprets the winning
//! completion ([`parser`]).

pub mod guard;
pub mod invoker;
pub mod parser;

use std::path::PathBuf;

use crate::config::MatcherConfig;
use invoker::{Completion, Invocation};
use parser::{ParseError, Verdict};

/// Terminal result of one match request; exactly one per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched { file: String },
    NoMatch,
    ProcessFailed { diagnostic: String },
    /// Exit 0 but no verdict line on stdout
    Unparseable { reason: String },
    TimedOut,
}

impl MatchOutcome {
    /// Short tag for logs
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::NoMatch => "no-match",
            Self::ProcessFailed { .. } => "process-failed",
            Self::Unparseable { .. } => "unparseable",
            Self::TimedOut => "timed-out",
        }
    }

    /// Map a finished run to an outcome
    pub fn from_completion(completion: &Completion) -> Self {
        if !completion.success() {
            let stderr = completion.stderr_text();
            let diagnostic = if stderr.trim().is_empty() {
                completion.exit_code.map_or_else(
                    || "matcher terminated without an exit code".to_string(),
                    |code| format!("matcher exited with status {code}"),
                )
            } else {
                stderr
            };
            return Self::ProcessFailed { diagnostic };
        }

        match parser::parse_verdict(&completion.stdout_text()) {
            Ok(Verdict::Matched(file)) => Self::Matched { file },
            Ok(Verdict::NoMatch) => Self::NoMatch,
            Err(e @ ParseError::EmptyOutput) => Self::Unparseable {
                reason: e.to_string(),
            },
        }
    }
}

/// Builds invocations for the configured matcher and runs them
#[derive(Debug, Clone)]
pub struct Matcher {
    config: MatcherConfig,
    media_dir: PathBuf,
}

impl Matcher {
    pub fn new(config: MatcherConfig, media_dir: PathBuf) -> Self {
        // The matcher may run in another working directory.
        let media_dir = std::path::absolute(&media_dir).unwrap_or(media_dir);
        Self { config, media_dir }
    }

    /// `<program> [args...] <sticker,sticker,...> <media dir>`
    pub fn invocation(&self, stickers: &[String]) -> Invocation {
        let mut args = self.config.args.clone();
        args.push(stickers.join(","));
        args.push(self.media_dir.to_string_lossy().into_owned());
        Invocation {
            program: self.config.program.clone(),
            args,
            cwd: self.config.working_dir.clone(),
        }
    }

    /// Run the matcher once for `stickers`.
    ///
    /// `None` means no finisher delivered an outcome (internal failure).
    pub async fn run(&self, stickers: &[String]) -> Option<MatchOutcome> {
        let run = invoker::invoke(&self.invocation(stickers));
        guard::resolve(run, self.config.timeout(), MatchOutcome::from_completion).await
    }
}
