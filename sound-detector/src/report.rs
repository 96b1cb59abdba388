/// Serial report protocol
///
/// Line-oriented `CATEGORY:FIELD:VALUE` messages exchanged between the sensor
/// and the alerting host. Emergencies and alerts are framed by `START`/`END`
/// lines; `EMERGENCY:HELP_DETECTED` is sent ahead of the block so the host can
/// react before the details arrive.

use crate::config::DeviceInfo;
use crate::monitor::{MonitorStats, Severity, SoundEvent};
use crate::sample_window::AdcSample;
use std::str::FromStr;
use thiserror::Error;
use tracing::{trace, warn};

pub const HELP_DETECTED: &str = "EMERGENCY:HELP_DETECTED";
pub const STATUS_READY: &str = "STATUS:READY";

const HELP_MESSAGE: &str = "HELP voice command detected";

#[derive(Error, Debug, PartialEq)]
pub enum ReportError {
    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: String, value: String },
}

/// Encode an event as protocol lines, in transmission order
pub fn encode_event(event: &SoundEvent, device: &DeviceInfo) -> Vec<String> {
    match event {
        SoundEvent::Ready { baseline } => {
            vec![STATUS_READY.to_string(), format!("BASELINE:{}", baseline)]
        }

        SoundEvent::Help(help) => {
            let mut lines = vec![
                HELP_DETECTED.to_string(),
                "EMERGENCY:START".to_string(),
                format!("EMERGENCY:ID:{}", help.id),
                "EMERGENCY:TYPE:HELP".to_string(),
                format!("EMERGENCY:SOUND_LEVEL:{}", help.level),
                format!("EMERGENCY:CONFIDENCE:{:.2}", help.confidence),
                format!("EMERGENCY:DEVICE:{}", device.device_id),
                format!("EMERGENCY:LOCATION:{}", device.location),
                format!("EMERGENCY:UPTIME:{}", help.uptime_ms),
                format!("EMERGENCY:MESSAGE:{}", HELP_MESSAGE),
            ];
            if !device.emergency_contact.is_empty() {
                lines.push(format!("EMERGENCY:CONTACT:{}", device.emergency_contact));
            }
            lines.push("EMERGENCY:END".to_string());
            lines
        }

        SoundEvent::Anomaly(anomaly) => vec![
            "ALERT:START".to_string(),
            format!("ALERT:ID:{}", anomaly.id),
            format!("ALERT:LEVEL:{}", anomaly.level),
            format!("ALERT:BASELINE:{}", anomaly.baseline),
            format!("ALERT:DIFFERENCE:{}", anomaly.difference),
            format!("ALERT:SEVERITY:{}", anomaly.severity),
            format!("ALERT:SCORE:{:.3}", anomaly.score),
            format!("ALERT:TREND:{}", anomaly.trend),
            format!("ALERT:DEVICE:{}", device.device_id),
            format!("ALERT:LOCATION:{}", device.location),
            format!("ALERT:UPTIME:{}", anomaly.uptime_ms),
            "ALERT:END".to_string(),
        ],
    }
}

/// Encode monitor statistics as `STATUS:` lines
pub fn encode_stats(stats: &MonitorStats) -> Vec<String> {
    let mut lines = vec![
        format!("STATUS:SAMPLES:{}", stats.samples_processed),
        format!("STATUS:HELP_DETECTIONS:{}", stats.help_detections),
        format!("STATUS:ANOMALIES:{}", stats.anomalies_detected),
        format!("STATUS:WINDOW_FILL:{:.0}", stats.window_fill_percent),
    ];
    match stats.baseline {
        Some(baseline) => lines.push(format!("STATUS:BASELINE:{}", baseline)),
        None => lines.push(format!("STATUS:CALIBRATING:{}", stats.calibration_progress)),
    }
    lines
}

/// Emergency block as received by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmergencyReport {
    pub id: Option<u32>,

    /// Sender-side timestamp, kept verbatim
    pub timestamp: Option<String>,
    pub kind: Option<String>,
    pub sound_level: Option<AdcSample>,
    pub confidence: Option<f32>,
    pub device_id: Option<String>,
    pub location: Option<String>,
    pub uptime_ms: Option<u64>,
    pub message: Option<String>,
    pub contact: Option<String>,
}

/// Alert block as received by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertReport {
    pub id: Option<u32>,
    pub timestamp: Option<String>,
    pub level: Option<AdcSample>,
    pub baseline: Option<AdcSample>,
    pub difference: Option<AdcSample>,
    pub severity: Option<Severity>,
    pub score: Option<f32>,
    pub trend: Option<String>,
    pub device_id: Option<String>,
    pub location: Option<String>,
    pub uptime_ms: Option<u64>,
}

/// Decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum ReportMessage {
    /// Immediate HELP notice, sent ahead of the emergency block
    HelpDetected,
    Emergency(EmergencyReport),
    Alert(AlertReport),
    Baseline(AdcSample),
    Status { field: String, value: String },
}

#[derive(Debug, Default)]
enum Block {
    #[default]
    Idle,
    Emergency(EmergencyReport),
    Alert(AlertReport),
}

/// Incremental parser for the report stream
#[derive(Debug, Default)]
pub struct ReportParser {
    block: Block,
}

impl ReportParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while inside an unterminated START/END block
    pub fn in_block(&self) -> bool {
        !matches!(self.block, Block::Idle)
    }

    /// Parse one line. Block fields accumulate silently; the completed report
    /// is returned on its `END` line. Unknown lines are ignored.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<ReportMessage>, ReportError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        trace!("Parsing report line: {}", line);

        match line {
            HELP_DETECTED => return Ok(Some(ReportMessage::HelpDetected)),
            "EMERGENCY:START" => {
                self.open(Block::Emergency(EmergencyReport::default()));
                return Ok(None);
            }
            "ALERT:START" => {
                self.open(Block::Alert(AlertReport::default()));
                return Ok(None);
            }
            "EMERGENCY:END" | "ALERT:END" => return Ok(self.close(line)),
            _ => {}
        }

        let mut parts = line.splitn(3, ':');
        let category = parts.next().unwrap_or_default();
        let field = match parts.next() {
            Some(field) => field,
            None => {
                // Banner and debug output share the serial stream
                trace!("Ignoring non-protocol line: {}", line);
                return Ok(None);
            }
        };
        let value = parts.next().unwrap_or_default();

        match (category, &mut self.block) {
            ("EMERGENCY", Block::Emergency(report)) => {
                apply_emergency_field(report, field, value)?;
                Ok(None)
            }
            ("ALERT", Block::Alert(report)) => {
                apply_alert_field(report, field, value)?;
                Ok(None)
            }
            ("BASELINE", _) => Ok(Some(ReportMessage::Baseline(parse_number("BASELINE", field)?))),
            ("STATUS", _) => Ok(Some(ReportMessage::Status {
                field: field.to_ascii_lowercase(),
                value: value.to_string(),
            })),
            _ => {
                trace!("Ignoring line outside of block: {}", line);
                Ok(None)
            }
        }
    }

    fn open(&mut self, block: Block) {
        if self.in_block() {
            warn!("Report block restarted before END, discarding partial block");
        }
        self.block = block;
    }

    fn close(&mut self, line: &str) -> Option<ReportMessage> {
        match (std::mem::take(&mut self.block), line) {
            (Block::Emergency(report), "EMERGENCY:END") => Some(ReportMessage::Emergency(report)),
            (Block::Alert(report), "ALERT:END") => Some(ReportMessage::Alert(report)),
            (block, _) => {
                // Mismatched END leaves the open block untouched
                self.block = block;
                None
            }
        }
    }
}

fn apply_emergency_field(
    report: &mut EmergencyReport,
    field: &str,
    value: &str,
) -> Result<(), ReportError> {
    match field.to_ascii_uppercase().as_str() {
        "ID" => report.id = Some(parse_number(field, value)?),
        "TIMESTAMP" => report.timestamp = Some(value.to_string()),
        "TYPE" => report.kind = Some(value.to_string()),
        "SOUND_LEVEL" => report.sound_level = Some(parse_number(field, value)?),
        "CONFIDENCE" => report.confidence = Some(parse_number(field, value)?),
        "DEVICE" => report.device_id = Some(value.to_string()),
        "LOCATION" => report.location = Some(value.to_string()),
        "UPTIME" => report.uptime_ms = Some(parse_number(field, value)?),
        "MESSAGE" => report.message = Some(value.to_string()),
        "CONTACT" => report.contact = Some(value.to_string()),
        _ => trace!("Ignoring unknown emergency field: {}", field),
    }
    Ok(())
}

fn apply_alert_field(report: &mut AlertReport, field: &str, value: &str) -> Result<(), ReportError> {
    match field.to_ascii_uppercase().as_str() {
        "ID" => report.id = Some(parse_number(field, value)?),
        "TIMESTAMP" => report.timestamp = Some(value.to_string()),
        "LEVEL" => report.level = Some(parse_number(field, value)?),
        "BASELINE" => report.baseline = Some(parse_number(field, value)?),
        "DIFFERENCE" => report.difference = Some(parse_number(field, value)?),
        "SEVERITY" => {
            report.severity = Some(value.parse().map_err(|_| ReportError::InvalidNumber {
                field: field.to_string(),
                value: value.to_string(),
            })?)
        }
        "SCORE" => report.score = Some(parse_number(field, value)?),
        "TREND" => report.trend = Some(value.to_string()),
        "DEVICE" => report.device_id = Some(value.to_string()),
        "LOCATION" => report.location = Some(value.to_string()),
        "UPTIME" => report.uptime_ms = Some(parse_number(field, value)?),
        _ => trace!("Ignoring unknown alert field: {}", field),
    }
    Ok(())
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T, ReportError> {
    value.trim().parse().map_err(|_| ReportError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{AnomalyEvent, HelpEvent};
    use crate::trend::SoundTrend;
    use approx::assert_relative_eq;

    fn device() -> DeviceInfo {
        DeviceInfo {
            device_id: "ESP32_TEST".to_string(),
            location: "Lab: bench 2".to_string(),
            emergency_contact: "+00 000".to_string(),
        }
    }

    fn anomaly() -> AnomalyEvent {
        AnomalyEvent {
            id: 7,
            uptime_ms: 123_456,
            level: 2600,
            baseline: 200,
            difference: 2400,
            severity: Severity::High,
            score: 7.5,
            trend: SoundTrend::Rising,
        }
    }

    #[test]
    fn test_encode_ready() {
        let lines = encode_event(&SoundEvent::Ready { baseline: 212 }, &device());
        assert_eq!(lines, vec!["STATUS:READY", "BASELINE:212"]);
    }

    #[test]
    fn test_encode_help_block() {
        let event = SoundEvent::Help(HelpEvent {
            id: 3,
            uptime_ms: 5000,
            level: 900,
            confidence: 1.0,
        });
        let lines = encode_event(&event, &device());

        assert_eq!(lines[0], HELP_DETECTED);
        assert_eq!(lines[1], "EMERGENCY:START");
        assert!(lines.contains(&"EMERGENCY:CONFIDENCE:1.00".to_string()));
        assert!(lines.contains(&"EMERGENCY:CONTACT:+00 000".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("EMERGENCY:END"));
    }

    #[test]
    fn test_help_without_contact_omits_line() {
        let event = SoundEvent::Help(HelpEvent {
            id: 1,
            uptime_ms: 0,
            level: 500,
            confidence: 0.7,
        });
        let lines = encode_event(&event, &DeviceInfo::default());
        assert!(!lines.iter().any(|l| l.starts_with("EMERGENCY:CONTACT")));
    }

    #[test]
    fn test_parse_encoded_alert() {
        let mut parser = ReportParser::new();
        let mut parsed = Vec::new();

        for line in encode_event(&SoundEvent::Anomaly(anomaly()), &device()) {
            if let Some(message) = parser.parse_line(&line).unwrap() {
                parsed.push(message);
            }
        }

        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            ReportMessage::Alert(report) => {
                assert_eq!(report.id, Some(7));
                assert_eq!(report.level, Some(2600));
                assert_eq!(report.difference, Some(2400));
                assert_eq!(report.severity, Some(Severity::High));
                assert_relative_eq!(report.score.unwrap_or_default(), 7.5);
                assert_eq!(report.trend.as_deref(), Some("RISING"));
                // Values may themselves contain ':'
                assert_eq!(report.location.as_deref(), Some("Lab: bench 2"));
                assert_eq!(report.uptime_ms, Some(123_456));
            }
            other => panic!("Expected alert, got {:?}", other),
        }
        assert!(!parser.in_block());
    }

    #[test]
    fn test_parse_immediate_help_and_status() {
        let mut parser = ReportParser::new();

        assert_eq!(parser.parse_line(HELP_DETECTED), Ok(Some(ReportMessage::HelpDetected)));
        assert_eq!(parser.parse_line("BASELINE:205"), Ok(Some(ReportMessage::Baseline(205))));
        assert_eq!(
            parser.parse_line("STATUS:READY"),
            Ok(Some(ReportMessage::Status {
                field: "ready".to_string(),
                value: String::new(),
            }))
        );
        assert_eq!(parser.parse_line("   "), Ok(None));
    }

    #[test]
    fn test_fields_outside_block_ignored() {
        let mut parser = ReportParser::new();
        assert_eq!(parser.parse_line("ALERT:LEVEL:900"), Ok(None));
        assert_eq!(parser.parse_line("ALERT:END"), Ok(None));
        assert_eq!(parser.parse_line("Calibrating baseline..."), Ok(None));
        assert!(!parser.in_block());
    }

    #[test]
    fn test_banner_lines_inside_block_ignored() {
        let mut parser = ReportParser::new();
        parser.parse_line("ALERT:START").unwrap();
        assert_eq!(parser.parse_line("=== ESP32 Sound Detector ==="), Ok(None));
        parser.parse_line("ALERT:LEVEL:900").unwrap();

        match parser.parse_line("ALERT:END") {
            Ok(Some(ReportMessage::Alert(report))) => assert_eq!(report.level, Some(900)),
            other => panic!("Expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_fields_kept() {
        let mut parser = ReportParser::new();
        for line in ["EMERGENCY:START", "EMERGENCY:TIMESTAMP:12:03:44", "EMERGENCY:TYPE:HELP"] {
            parser.parse_line(line).unwrap();
        }
        match parser.parse_line("EMERGENCY:END") {
            Ok(Some(ReportMessage::Emergency(report))) => {
                assert_eq!(report.timestamp.as_deref(), Some("12:03:44"));
            }
            other => panic!("Expected emergency, got {:?}", other),
        }

        for line in ["ALERT:START", "ALERT:timestamp:98765"] {
            parser.parse_line(line).unwrap();
        }
        match parser.parse_line("ALERT:END") {
            Ok(Some(ReportMessage::Alert(report))) => {
                assert_eq!(report.timestamp.as_deref(), Some("98765"));
            }
            other => panic!("Expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number() {
        let mut parser = ReportParser::new();
        parser.parse_line("EMERGENCY:START").unwrap();

        let result = parser.parse_line("EMERGENCY:SOUND_LEVEL:loud");
        assert_eq!(
            result,
            Err(ReportError::InvalidNumber {
                field: "SOUND_LEVEL".to_string(),
                value: "loud".to_string(),
            })
        );
    }

    #[test]
    fn test_restarted_block_discards_partial() {
        let mut parser = ReportParser::new();
        parser.parse_line("ALERT:START").unwrap();
        parser.parse_line("ALERT:LEVEL:900").unwrap();
        parser.parse_line("EMERGENCY:START").unwrap();
        parser.parse_line("EMERGENCY:TYPE:HELP").unwrap();

        // Mismatched END keeps the emergency open
        assert_eq!(parser.parse_line("ALERT:END"), Ok(None));
        assert!(parser.in_block());

        match parser.parse_line("EMERGENCY:END") {
            Ok(Some(ReportMessage::Emergency(report))) => {
                assert_eq!(report.kind.as_deref(), Some("HELP"));
            }
            other => panic!("Expected emergency, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_stats() {
        let stats = MonitorStats {
            samples_processed: 1200,
            help_detections: 1,
            anomalies_detected: 4,
            baseline: None,
            window_fill_percent: 100.0,
            calibration_progress: 32,
        };
        let lines = encode_stats(&stats);

        assert_eq!(lines[0], "STATUS:SAMPLES:1200");
        assert!(lines.contains(&"STATUS:WINDOW_FILL:100".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("STATUS:CALIBRATING:32"));

        let mut parser = ReportParser::new();
        assert_eq!(
            parser.parse_line(&lines[3]),
            Ok(Some(ReportMessage::Status {
                field: "window_fill".to_string(),
                value: "100".to_string(),
            }))
        );
    }
}
