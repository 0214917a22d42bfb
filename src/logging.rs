use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Decode event for logging and debugging
#[derive(Debug, Clone)]
pub struct DecodeEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: DecodeEventType,
    /// Sample position the event refers to, when there is one
    pub position: Option<u64>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEventType {
    StreamOpened,
    LoopTransition,
    Seek,
    DecodeError,
    SilenceSubstituted,
    StreamClosed,
}

impl DecodeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeEventType::StreamOpened => "STREAM_OPENED",
            DecodeEventType::LoopTransition => "LOOP_TRANSITION",
            DecodeEventType::Seek => "SEEK",
            DecodeEventType::DecodeError => "DECODE_ERROR",
            DecodeEventType::SilenceSubstituted => "SILENCE_SUBSTITUTED",
            DecodeEventType::StreamClosed => "STREAM_CLOSED",
        }
    }
}

/// Logger for stream lifecycle and decode events
#[derive(Clone)]
pub struct DecodeLogger {
    events: Arc<Mutex<VecDeque<DecodeEvent>>>,
    max_events: usize,
}

impl Default for DecodeLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeLogger {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events,
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("GASTREAM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(parse_level(&log_level));
        builder.try_init()?;

        info!("Decoder logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Record an event and forward it to `log`
    pub fn log_event(&self, event_type: DecodeEventType, position: Option<u64>, details: String) {
        match event_type {
            DecodeEventType::StreamOpened | DecodeEventType::StreamClosed => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            DecodeEventType::LoopTransition | DecodeEventType::Seek => {
                debug!("[{}] {} (sample {:?})", event_type.as_str(), details, position);
            }
            DecodeEventType::SilenceSubstituted => {
                warn!("[{}] {} (sample {:?})", event_type.as_str(), details, position);
            }
            DecodeEventType::DecodeError => {
                error!("[{}] {} (sample {:?})", event_type.as_str(), details, position);
            }
        }

        let event = DecodeEvent {
            timestamp: Utc::now(),
            event_type,
            position,
            details,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_stream_opened(&self, name: &str, summary: &str) {
        self.log_event(
            DecodeEventType::StreamOpened,
            None,
            format!("Opened '{}' ({})", name, summary),
        );
    }

    pub fn log_loop_transition(&self, from: u64, to: u64, count: u32) {
        self.log_event(
            DecodeEventType::LoopTransition,
            Some(from),
            format!("Loop {} jumped back to sample {}", count, to),
        );
    }

    pub fn log_seek(&self, from: u64, to: u64) {
        self.log_event(DecodeEventType::Seek, Some(to), format!("Seek from sample {}", from));
    }

    pub fn log_decode_error(&self, position: u64, error: &str) {
        self.log_event(DecodeEventType::DecodeError, Some(position), error.to_string());
    }

    pub fn log_silence_substituted(&self, position: u64, samples: usize) {
        self.log_event(
            DecodeEventType::SilenceSubstituted,
            Some(position),
            format!("{} samples replaced with silence", samples),
        );
    }

    pub fn log_stream_closed(&self, name: &str, rendered: u64) {
        self.log_event(
            DecodeEventType::StreamClosed,
            None,
            format!("Closed '{}' after {} samples", name, rendered),
        );
    }

    /// Get recent events for debugging, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<DecodeEvent> {
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(count);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        let Ok(events) = self.events.lock() else {
            return stats;
        };

        for event in events.iter() {
            match event.event_type {
                DecodeEventType::LoopTransition => stats.loop_transitions += 1,
                DecodeEventType::Seek => stats.seeks += 1,
                DecodeEventType::DecodeError => stats.decode_errors += 1,
                DecodeEventType::SilenceSubstituted => stats.substitutions += 1,
                DecodeEventType::StreamOpened | DecodeEventType::StreamClosed => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub loop_transitions: usize,
    pub seeks: usize,
    pub decode_errors: usize,
    pub substitutions: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_logger_creation() {
        let logger = DecodeLogger::new();
        assert_eq!(logger.max_events, 1000);
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = DecodeLogger::new();
        logger.log_event(DecodeEventType::Seek, Some(42), "Test seek".to_string());

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Test seek");
        assert_eq!(events[0].position, Some(42));
        assert_eq!(events[0].event_type, DecodeEventType::Seek);
    }

    #[test]
    fn test_event_history_limit() {
        let logger = DecodeLogger::with_capacity(3);
        for i in 0..5 {
            logger.log_event(DecodeEventType::StreamOpened, None, format!("Event {}", i));
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_event_statistics() {
        let logger = DecodeLogger::new();
        logger.log_stream_opened("a.wem", "PCM16LE");
        logger.log_loop_transition(100, 10, 1);
        logger.log_loop_transition(100, 10, 2);
        logger.log_decode_error(50, "corrupt frame");
        logger.log_silence_substituted(50, 14);
        logger.log_seek(0, 20);
        logger.log_stream_closed("a.wem", 300);

        let stats = logger.get_event_statistics();
        assert_eq!(stats.total_events, 7);
        assert_eq!(stats.loop_transitions, 2);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.substitutions, 1);
        assert_eq!(stats.seeks, 1);
    }

    #[test]
    fn test_clear_events() {
        let logger = DecodeLogger::new();
        logger.log_seek(0, 1);
        logger.clear_events();
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("off"), log::LevelFilter::Off);
        assert_eq!(parse_level("loud"), log::LevelFilter::Info);
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(DecodeEventType::LoopTransition.as_str(), "LOOP_TRANSITION");
        assert_eq!(DecodeEventType::SilenceSubstituted.as_str(), "SILENCE_SUBSTITUTED");
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        thread::sleep(Duration::from_millis(10));
        assert!(timer.finish() >= Duration::from_millis(10));
    }
}
