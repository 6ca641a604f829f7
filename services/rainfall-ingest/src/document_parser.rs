//! Contract with the external table extractor.
//!
//! Extraction itself is opaque to this service: a [`DocumentParser`] takes the
//! path of a staged document and returns its table rows in order. The
//! production implementation, [`CommandParser`], runs an external program
//! and reads the rows as JSON from its stdout.

use crate::config::ParserConfig;
use crate::error::ParserError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// One extracted row: column name to value, in column order
pub type ParsedRecord = serde_json::Map<String, Value>;

/// Timeout for the capability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Table extraction capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parser type name reported by the diagnostics endpoints
    fn kind(&self) -> &'static str;

    /// Check that the parser is usable without processing a document
    async fn probe(&self) -> Result<(), ParserError>;

    /// Extract the ordered table rows of the document at `path`
    async fn extract(&self, path: &Path) -> Result<Vec<ParsedRecord>, ParserError>;
}

/// Runs an external extractor program per document.
///
/// The program is invoked as `program [args..] <path>` and must print either
/// a JSON array of objects or an object with a `records` array. Empty output
/// means the document held no rows.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: String,
    args: Vec<String>,
    probe_args: Vec<String>,
    timeout: Duration,
}

impl CommandParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            probe_args: config.probe_args.clone(),
            timeout: config.timeout(),
        }
    }

    async fn run(&self, command: &mut Command, timeout: Duration) -> Result<Output, ParserError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ParserError::Launch {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout kills the child
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ParserError::Timeout(timeout))?
            .map_err(|source| ParserError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ParserError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl DocumentParser for CommandParser {
    fn kind(&self) -> &'static str {
        "CommandParser"
    }

    async fn probe(&self) -> Result<(), ParserError> {
        let mut command = Command::new(&self.program);
        command.args(&self.probe_args);
        self.run(&mut command, PROBE_TIMEOUT).await.map(|_| ())
    }

    #[instrument(skip(self), fields(program = %self.program))]
    async fn extract(&self, path: &Path) -> Result<Vec<ParsedRecord>, ParserError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(path);

        let output = self.run(&mut command, self.timeout).await?;
        let records = parse_records(&output.stdout)?;

        debug!(records = records.len(), "Extractor finished");
        Ok(records)
    }
}

/// Decode extractor stdout into records
pub fn parse_records(stdout: &[u8]) -> Result<Vec<ParsedRecord>, ParserError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_slice(stdout).map_err(|e| ParserError::InvalidOutput(e.to_string()))?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("records") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(ParserError::InvalidOutput(
                    "expected a `records` array".to_string(),
                ))
            }
        },
        other => {
            return Err(ParserError::InvalidOutput(format!(
                "expected an array of rows, got {}",
                json_type(&other)
            )))
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(record) => Ok(record),
            other => Err(ParserError::InvalidOutput(format!(
                "row {index} is {}, expected an object",
                json_type(&other)
            ))),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_array() {
        let records = parse_records(
            br#"[{"station": "Alpha", "rainfall_mm": 12.5}, {"station": "Beta", "rainfall_mm": 0}]"#,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["station"], "Alpha");
        assert_eq!(records[1]["rainfall_mm"], 0);
    }

    #[test]
    fn test_parse_records_preserves_column_order() {
        let records = parse_records(br#"[{"zone": "N", "station": "A", "mm": 1}]"#).unwrap();
        let columns: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["zone", "station", "mm"]);
    }

    #[test]
    fn test_parse_records_wrapped_object() {
        let records = parse_records(br#"{"records": [{"station": "Alpha"}]}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_records_empty_output() {
        assert!(parse_records(b"").unwrap().is_empty());
        assert!(parse_records(b"  \n").unwrap().is_empty());
        assert!(parse_records(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_records_rejects_non_object_rows() {
        let err = parse_records(br#"[{"station": "Alpha"}, 3]"#).unwrap_err();
        assert!(matches!(err, ParserError::InvalidOutput(msg) if msg.contains("row 1")));
    }

    #[test]
    fn test_parse_records_rejects_garbage() {
        assert!(matches!(
            parse_records(b"Traceback (most recent call last)"),
            Err(ParserError::InvalidOutput(_))
        ));
        assert!(matches!(
            parse_records(b"\"just a string\""),
            Err(ParserError::InvalidOutput(_))
        ));
    }

    #[cfg(unix)]
    mod command {
        use super::*;

        fn shell_parser(script: &str, timeout_secs: u64) -> CommandParser {
            // `sh -c script path` binds the staged path to $0
            CommandParser::new(&ParserConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                probe_args: vec!["-c".to_string(), "exit 0".to_string()],
                timeout_secs,
            })
        }

        #[tokio::test]
        async fn test_extract_reads_stdout() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            std::io::Write::write_all(&mut file, br#"[{"station": "Alpha", "mm": 3.2}]"#)
                .unwrap();

            let parser = shell_parser("cat \"$0\"", 5);
            let records = parser.extract(file.path()).await.unwrap();

            assert_eq!(records.len(), 1);
            assert_eq!(records[0]["station"], "Alpha");
        }

        #[tokio::test]
        async fn test_extract_reports_failed_exit() {
            let parser = shell_parser("echo 'no tables found' >&2; exit 3", 5);
            let err = parser.extract(Path::new("/tmp/x.pdf")).await.unwrap_err();

            match err {
                ParserError::Failed { stderr, .. } => assert_eq!(stderr, "no tables found"),
                other => panic!("expected Failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_extract_times_out() {
            let parser = CommandParser {
                timeout: Duration::from_millis(100),
                ..shell_parser("sleep 5", 1)
            };
            let err = parser.extract(Path::new("/tmp/x.pdf")).await.unwrap_err();
            assert!(matches!(err, ParserError::Timeout(_)));
        }

        #[tokio::test]
        async fn test_probe() {
            assert!(shell_parser("true", 5).probe().await.is_ok());

            let missing = CommandParser::new(&ParserConfig {
                program: "rainfall-extract-missing-binary".to_string(),
                ..ParserConfig::default()
            });
            assert!(matches!(
                missing.probe().await,
                Err(ParserError::Launch { .. })
            ));
        }
    }
}
