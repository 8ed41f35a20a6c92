use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub searches: SearchTelemetrySummary,
    pub transitions: TransitionTelemetrySummary,
    pub found: FoundTelemetrySummary,
    pub trial_status: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchTelemetrySummary {
    /// Failed searches.
    pub count: usize,
    pub failures_by_terrain: BTreeMap<String, usize>,
    pub avg_prior: Option<f64>,
    pub avg_posterior: Option<f64>,
    pub avg_released: Option<f64>,
    /// Only present when belief details were logged.
    pub avg_entropy: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct TransitionTelemetrySummary {
    pub count: usize,
    pub pair_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct FoundTelemetrySummary {
    pub count: usize,
    pub by_terrain: BTreeMap<String, usize>,
    pub avg_moves: Option<f64>,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add_field(&mut self, fields: &Map<String, Value>, key: &str) {
        if let Some(value) = fields.get(key).and_then(Value::as_f64) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, fields: &Map<String, Value>, key: &str) {
    let label = fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("<unset>");
    *counts.entry(label.to_string()).or_insert(0) += 1;
}

/// Aggregate search, transition and trial events from a JSON telemetry log.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();
    let mut prior_avg = Average::new();
    let mut posterior_avg = Average::new();
    let mut released_avg = Average::new();
    let mut entropy_avg = Average::new();
    let mut found_moves_avg = Average::new();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match target {
            "seeker_bot::search" => {
                summary.searches.count += 1;
                bump(&mut summary.searches.failures_by_terrain, &fields, "terrain");
                prior_avg.add_field(&fields, "prior");
                posterior_avg.add_field(&fields, "posterior");
                released_avg.add_field(&fields, "released");
                entropy_avg.add_field(&fields, "entropy");
            }
            "seeker_bot::transition" => {
                summary.transitions.count += 1;
                bump(&mut summary.transitions.pair_counts, &fields, "pair");
            }
            "seeker_bot::found" => {
                summary.found.count += 1;
                bump(&mut summary.found.by_terrain, &fields, "terrain");
                found_moves_avg.add_field(&fields, "moves");
            }
            "seeker_bench::trial" => {
                bump(&mut summary.trial_status, &fields, "status");
            }
            _ => {}
        }
    }

    summary.searches.avg_prior = prior_avg.mean();
    summary.searches.avg_posterior = posterior_avg.mean();
    summary.searches.avg_released = released_avg.mean();
    summary.searches.avg_entropy = entropy_avg.mean();
    summary.found.avg_moves = found_moves_avg.mean();

    Ok(summary)
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(&json_path, serde_json::to_vec_pretty(&summary)?).map_err(|source| {
        TelemetryError::Io {
            context: "writing telemetry summary json",
            source,
        }
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let summary = &outputs.summary;
    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    section.push_str(&format!(
        "- Failed searches captured: {}\n",
        summary.searches.count
    ));
    if let Some(value) = summary.searches.avg_released {
        section.push_str(&format!("- Avg belief released per miss: {value:.4}\n"));
    }
    section.push_str(&format!(
        "- Transitions observed: {}\n",
        summary.transitions.count
    ));
    section.push_str(&format!("- Targets found: {}\n", summary.found.count));

    section.push_str("\n### Misses by Terrain\n");
    push_counts(&mut section, &summary.searches.failures_by_terrain);

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn push_counts(output: &mut String, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        output.push_str("- <none>\n");
        return;
    }
    for (label, count) in counts {
        output.push_str(&format!("- {label}: {count}\n"));
    }
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n\n", telemetry_path.display()));

    output.push_str("## Failed Searches\n");
    output.push_str(&format!("- Events: {}\n", summary.searches.count));
    for (label, value, precision) in [
        ("Avg prior at searched cell", summary.searches.avg_prior, 4usize),
        ("Avg posterior at searched cell", summary.searches.avg_posterior, 4),
        ("Avg released mass", summary.searches.avg_released, 4),
        ("Avg belief entropy", summary.searches.avg_entropy, 3),
    ] {
        if let Some(value) = value {
            output.push_str(&format!("- {label}: {value:.precision$}\n"));
        }
    }
    output.push_str("- By terrain:\n");
    for (label, count) in &summary.searches.failures_by_terrain {
        output.push_str(&format!("  - {label}: {count}\n"));
    }
    output.push('\n');

    output.push_str("## Transitions\n");
    output.push_str(&format!("- Events: {}\n", summary.transitions.count));
    push_counts(&mut output, &summary.transitions.pair_counts);
    output.push('\n');

    output.push_str("## Found\n");
    output.push_str(&format!("- Events: {}\n", summary.found.count));
    if let Some(value) = summary.found.avg_moves {
        output.push_str(&format!("- Avg moves: {value:.2}\n"));
    }
    push_counts(&mut output, &summary.found.by_terrain);
    output.push('\n');

    output.push_str("## Trial Status\n");
    push_counts(&mut output, &summary.trial_status);
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        for line in lines {
            writeln!(file, "{line}").expect("write line");
        }
        file
    }

    #[test]
    fn summarises_search_transition_and_found_events() {
        let file = write_temp_file(&[
            r#"{"target":"seeker_bot::search","fields":{"terrain":"caves","prior":0.2,"posterior":0.1,"released":0.1}}"#,
            r#"{"target":"seeker_bot::search","fields":{"terrain":"caves","prior":0.4,"posterior":0.3,"released":0.1,"entropy":2.0}}"#,
            r#"{"target":"seeker_bot::search","fields":{"terrain":"flat","prior":0.6,"posterior":0.2,"released":0.4}}"#,
            r#"{"target":"seeker_bot::transition","fields":{"pair":"flat-hilly"}}"#,
            r#"{"target":"seeker_bot::found","fields":{"terrain":"flat","moves":12}}"#,
            r#"{"target":"seeker_bench::trial","fields":{"status":"found"}}"#,
            r#"{"target":"other::noise","fields":{}}"#,
            "",
        ]);

        let summary = summarise_telemetry(file.path()).expect("summarise");

        assert_eq!(summary.searches.count, 3);
        assert_eq!(summary.searches.failures_by_terrain.get("caves"), Some(&2));
        assert_eq!(summary.searches.failures_by_terrain.get("flat"), Some(&1));
        assert!((summary.searches.avg_prior.unwrap() - 0.4).abs() < 1e-12);
        assert!((summary.searches.avg_posterior.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(summary.searches.avg_entropy, Some(2.0));
        assert_eq!(summary.transitions.pair_counts.get("flat-hilly"), Some(&1));
        assert_eq!(summary.found.count, 1);
        assert_eq!(summary.found.avg_moves, Some(12.0));
        assert_eq!(summary.trial_status.get("found"), Some(&1));
    }

    #[test]
    fn missing_log_yields_empty_summary() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.jsonl");
        let summary = summarise_telemetry(&path).expect("summarise missing file");
        assert_eq!(summary.searches.count, 0);
        assert!(summary.searches.avg_prior.is_none());
        assert!(summary.transitions.pair_counts.is_empty());
        assert!(write_summary_outputs(&path, dir.path()).unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_an_error() {
        let file = write_temp_file(&["{not json"]);
        assert!(matches!(
            summarise_telemetry(file.path()),
            Err(TelemetryError::Json(_))
        ));
    }

    #[test]
    fn writes_json_and_markdown_outputs() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("telemetry.jsonl");
        std::fs::write(
            &log,
            "{\"target\":\"seeker_bot::transition\",\"fields\":{\"pair\":\"caves-forested\"}}\n",
        )
        .unwrap();

        let outputs = write_summary_outputs(&log, dir.path())
            .expect("write outputs")
            .expect("log exists");

        let json = std::fs::read_to_string(&outputs.json_path).unwrap();
        assert!(json.contains("caves-forested"));
        let markdown = std::fs::read_to_string(&outputs.markdown_path).unwrap();
        assert!(markdown.contains("## Transitions"));
        assert!(markdown.contains("- caves-forested: 1"));
    }

    #[test]
    fn appends_highlights_to_summary_markdown() {
        let mut summary_file = tempfile::NamedTempFile::new().expect("summary temp file");
        writeln!(summary_file, "# Search Summary").expect("seed summary content");

        let mut failures = BTreeMap::new();
        failures.insert("forested".to_string(), 7);
        failures.insert("caves".to_string(), 11);

        let outputs = TelemetryOutputs {
            summary: TelemetrySummary {
                searches: SearchTelemetrySummary {
                    count: 18,
                    failures_by_terrain: failures,
                    avg_released: Some(0.0125),
                    ..Default::default()
                },
                transitions: TransitionTelemetrySummary {
                    count: 4,
                    pair_counts: BTreeMap::new(),
                },
                found: FoundTelemetrySummary {
                    count: 2,
                    ..Default::default()
                },
                trial_status: BTreeMap::new(),
            },
            json_path: PathBuf::from("telemetry_summary.json"),
            markdown_path: PathBuf::from("telemetry_summary.md"),
        };

        append_highlights_to_markdown(summary_file.path(), &outputs).expect("append highlights");

        let contents = std::fs::read_to_string(summary_file.path()).expect("read summary file");
        assert!(contents.starts_with("# Search Summary"));
        assert!(contents.contains("## Telemetry Highlights"));
        assert!(contents.contains("Failed searches captured: 18"));
        assert!(contents.contains("Avg belief released per miss: 0.0125"));
        assert!(contents.contains("Transitions observed: 4"));
        assert!(contents.contains("- caves: 11"));
    }
}
