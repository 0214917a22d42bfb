use crate::config::{DecodeErrorPolicy, DecoderConfig};
use crate::error::{EngineError, RenderFailure};
use crate::logging::DecodeLogger;
use crate::stream::{Rendered, Stream};
use log::{info, warn};

/// Applies the configured decode error policy to render failures
pub struct RecoveryManager {
    logger: DecodeLogger,
    policy: DecodeErrorPolicy,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    total_failures: u32,
    substituted_samples: u64,
}

impl RecoveryManager {
    pub fn new(logger: DecodeLogger, policy: DecodeErrorPolicy, max_consecutive_failures: u32) -> Self {
        Self {
            logger,
            policy,
            max_consecutive_failures,
            consecutive_failures: 0,
            total_failures: 0,
            substituted_samples: 0,
        }
    }

    pub fn from_config(logger: DecodeLogger, config: &DecoderConfig) -> Self {
        Self::new(logger, config.error_policy, config.max_consecutive_failures)
    }

    /// Handle a failed render. `out` is the caller's buffer just past the
    /// samples the failing call already wrote.
    pub fn handle_failure(&mut self, stream: &mut Stream<'_>, failure: &RenderFailure, out: &mut [i16]) -> RecoveryResult {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.logger.log_decode_error(failure.position, &failure.cause.to_string());

        if self.policy == DecodeErrorPolicy::Abort {
            return RecoveryResult::Abort(failure.cause.user_message());
        }
        if self.consecutive_failures > self.max_consecutive_failures {
            warn!(
                "Giving up after {} consecutive decode failures",
                self.consecutive_failures - 1
            );
            return RecoveryResult::Abort(format!(
                "{} consecutive decode failures, last: {}",
                self.consecutive_failures - 1,
                failure.cause.user_message()
            ));
        }
        if failure.run_samples == 0 {
            return RecoveryResult::Abort(format!(
                "Cannot step over failure at sample {}: {}",
                failure.position,
                failure.cause.user_message()
            ));
        }

        let channels = stream.channels().max(1);
        let run = failure.run_samples.min(out.len() / channels);
        match stream.render_silence(out, run) {
            Ok(rendered) => {
                self.substituted_samples += rendered.samples as u64;
                self.logger.log_silence_substituted(failure.position, rendered.samples);
                RecoveryResult::Substituted(rendered)
            }
            Err(e) => RecoveryResult::Abort(e.user_message()),
        }
    }

    /// Note a clean render, resetting the consecutive failure count
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!("Decoding recovered after {} failures", self.consecutive_failures);
        }
        self.consecutive_failures = 0;
    }

    /// Render with the policy applied. A failure under `Silence` comes back as a
    /// short render covering the written samples plus the silenced run.
    pub fn render(&mut self, stream: &mut Stream<'_>, out: &mut [i16], sample_count: usize) -> Result<Rendered, EngineError> {
        let transitions = stream.loop_transitions();
        match stream.render(out, sample_count) {
            Ok(rendered) => {
                self.record_success();
                Ok(rendered)
            }
            Err(EngineError::Render(failure)) => {
                let written = failure.samples_written;
                let offset = written * stream.channels();
                match self.handle_failure(stream, &failure, &mut out[offset..]) {
                    // the failing call may already have taken the loop jump
                    RecoveryResult::Substituted(silence) => Ok(Rendered {
                        samples: written + silence.samples,
                        end_of_stream: silence.end_of_stream,
                        looped: silence.looped || stream.loop_transitions() > transitions,
                    }),
                    RecoveryResult::Abort(_) => Err(EngineError::Render(failure)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_recovery_statistics(&self) -> RecoveryStatistics {
        RecoveryStatistics {
            total_failures: self.total_failures,
            consecutive_failures: self.consecutive_failures,
            substituted_samples: self.substituted_samples,
        }
    }
}

/// Result of applying the policy to one failure
#[derive(Debug, Clone)]
pub enum RecoveryResult {
    /// Silence was rendered over the failing run
    Substituted(Rendered),
    /// Rendering must stop
    Abort(String),
}

impl RecoveryResult {
    pub fn is_substituted(&self) -> bool {
        matches!(self, RecoveryResult::Substituted(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, RecoveryResult::Abort(_))
    }
}

/// Statistics about error recovery operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStatistics {
    pub total_failures: u32,
    pub consecutive_failures: u32,
    pub substituted_samples: u64,
}
