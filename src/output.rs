use crate::table::RowReport;
use anyhow::{Result, anyhow, bail};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

const HEADERS: [&str; 5] = ["row", "outcome", "reason", "raw", "text"];

pub enum Writer {
    Stdout(Box<dyn Write>),
    JsonStdout(Box<dyn Write>, bool),
    JsonFile(BufWriter<File>, bool), // bool tracks if we've written the opening bracket
    JsonlFile(BufWriter<File>),
    CsvFile(BufWriter<File>, bool), // bool tracks if we've written headers
    TsvFile(BufWriter<File>, bool),
}

impl Writer {
    pub fn write_batch(&mut self, reports: &[RowReport]) -> Result<()> {
        match self {
            Writer::Stdout(writer) => {
                for report in reports {
                    writeln!(writer, "{:#?}", report)?;
                }
            }
            Writer::JsonStdout(writer, is_first) => {
                write_json(writer, is_first, reports)?;
            }
            Writer::JsonFile(writer, is_first) => {
                write_json(writer, is_first, reports)?;
            }
            Writer::JsonlFile(writer) => {
                for report in reports {
                    let serialized = serde_json::to_string(report)?;
                    writeln!(writer, "{}", serialized)?;
                }
            }
            Writer::CsvFile(writer, headers_written) => {
                if !*headers_written {
                    writeln!(writer, "{}", HEADERS.join(","))?;
                    *headers_written = true;
                }
                for report in reports {
                    let fields = columns(report).map(|f| escape_csv_field(&f));
                    writeln!(writer, "{}", fields.join(","))?;
                }
            }
            Writer::TsvFile(writer, headers_written) => {
                if !*headers_written {
                    writeln!(writer, "{}", HEADERS.join("\t"))?;
                    *headers_written = true;
                }
                for report in reports {
                    let fields = columns(report).map(|f| escape_tsv_field(&f));
                    writeln!(writer, "{}", fields.join("\t"))?;
                }
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        match self {
            Writer::JsonStdout(ref mut writer, is_first) => {
                close_json(writer, is_first)?;
            }
            Writer::JsonFile(ref mut writer, is_first) => {
                close_json(writer, is_first)?;
            }
            Writer::JsonlFile(ref mut writer)
            | Writer::CsvFile(ref mut writer, _)
            | Writer::TsvFile(ref mut writer, _) => {
                writer.flush()?;
            }
            Writer::Stdout(ref mut writer) => {
                writer.flush()?;
            }
        }
        Ok(())
    }
}

fn write_json<W: Write + ?Sized>(
    writer: &mut W,
    is_first: &mut bool,
    reports: &[RowReport],
) -> Result<()> {
    for report in reports {
        if *is_first {
            write!(writer, "[")?;
            *is_first = false;
        } else {
            write!(writer, ",")?;
        }
        let serialized = serde_json::to_string_pretty(report)?;
        write!(writer, "\n{}", serialized)?;
    }
    Ok(())
}

fn close_json<W: Write + ?Sized>(writer: &mut W, is_first: bool) -> Result<()> {
    if is_first {
        // nothing written yet
        writeln!(writer, "[]")?;
    } else {
        writeln!(writer, "\n]")?;
    }
    writer.flush()?;
    Ok(())
}

fn columns(report: &RowReport) -> [String; 5] {
    [
        report.row.to_string(),
        report.outcome.kind().to_string(),
        report
            .outcome
            .skip()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        report.raw.clone().unwrap_or_default(),
        report.outcome.text().unwrap_or("").to_string(),
    ]
}

/// Report targets that print to stdout rather than a file.
pub fn is_stdout_target(output_arg: &str) -> bool {
    matches!(output_arg, "stdout" | "json")
}

/// The rewritten document and a stdout report cannot share one stream.
pub fn check_streams(document: &str, report: Option<&str>) -> Result<()> {
    if let Some(report) = report {
        if document == "-" && is_stdout_target(report) {
            bail!(
                "report target '{}' would be mixed into the document on stdout; \
                 write the document with -o FILE or the report to a file",
                report
            );
        }
    }
    Ok(())
}

pub fn create_writer(output_arg: &str) -> Result<Writer> {
    match output_arg {
        "stdout" => Ok(Writer::Stdout(Box::new(io::stdout()))),
        "json" => Ok(Writer::JsonStdout(Box::new(io::stdout()), true)),
        path if path.ends_with(".json") => Ok(Writer::JsonFile(open(path)?, true)),
        path if path.ends_with(".jsonl") || path.ends_with(".ndjson") => {
            Ok(Writer::JsonlFile(open(path)?))
        }
        path if path.ends_with(".csv") => Ok(Writer::CsvFile(open(path)?, false)),
        path if path.ends_with(".tsv") => Ok(Writer::TsvFile(open(path)?, false)),
        path => {
            // Default to JSON file if it looks like a path
            if path.contains('/') || path.contains('\\') || path.contains('.') {
                Ok(Writer::JsonFile(open(path)?, true))
            } else {
                Err(anyhow!(
                    "Unknown report format: {}. Use 'stdout', 'json', or a file path",
                    output_arg
                ))
            }
        }
    }
}

fn open(path: &str) -> Result<BufWriter<File>> {
    create_parent_dirs(path)?;
    Ok(BufWriter::new(File::create(path)?))
}

pub fn create_parent_dirs(file_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(file_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn escape_tsv_field(field: &str) -> String {
    field
        .replace('\t', " ")
        .replace('\n', " ")
        .replace('\r', " ")
}

pub fn write(output_arg: &str, reports: &[RowReport]) -> Result<()> {
    let mut writer = create_writer(output_arg)?;
    writer.write_batch(reports)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{Outcome, Skip};

    fn sample() -> Vec<RowReport> {
        vec![
            RowReport {
                row: 1,
                raw: Some("2025-07-13 23:19:16.891612889".to_string()),
                outcome: Outcome::Reformatted {
                    text: "2025-07-13 23:19:16.891".to_string(),
                },
            },
            RowReport {
                row: 2,
                raw: Some("pending, \"soon\"".to_string()),
                outcome: Outcome::Unchanged {
                    reason: Skip::NoMatch,
                },
            },
            RowReport {
                row: 3,
                raw: None,
                outcome: Outcome::Unchanged {
                    reason: Skip::MissingCell,
                },
            },
        ]
    }

    #[test]
    fn csv_report_escapes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.csv");
        write(path.to_str().unwrap(), &sample()).unwrap();

        let out = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "row,outcome,reason,raw,text");
        assert_eq!(
            lines[1],
            "1,reformatted,,2025-07-13 23:19:16.891612889,2025-07-13 23:19:16.891"
        );
        assert_eq!(lines[2], "2,unchanged,no_match,\"pending, \"\"soon\"\"\",");
        assert_eq!(lines[3], "3,unchanged,missing_cell,,");
    }

    #[test]
    fn jsonl_report_has_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        write(path.to_str().unwrap(), &sample()).unwrap();

        let out = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0]["outcome"]["reformatted"]["text"],
            "2025-07-13 23:19:16.891"
        );
        assert_eq!(rows[2]["raw"], serde_json::Value::Null);
        assert_eq!(rows[2]["outcome"]["unchanged"]["reason"], "missing_cell");
    }

    #[test]
    fn json_report_is_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut writer = create_writer(path.to_str().unwrap()).unwrap();
        let reports = sample();
        writer.write_batch(&reports[..1]).unwrap();
        writer.write_batch(&reports[1..]).unwrap();
        writer.finish().unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[test]
    fn empty_json_report_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        write(path.to_str().unwrap(), &[]).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[test]
    fn tsv_flattens_control_whitespace() {
        assert_eq!(escape_tsv_field("a\tb\nc"), "a b c");
    }

    #[test]
    fn stdout_report_needs_document_elsewhere() {
        assert!(check_streams("-", Some("json")).is_err());
        assert!(check_streams("-", Some("stdout")).is_err());
        assert!(check_streams("out.html", Some("json")).is_ok());
        assert!(check_streams("-", Some("report.jsonl")).is_ok());
        assert!(check_streams("-", None).is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(create_writer("xml").is_err());
    }
}
