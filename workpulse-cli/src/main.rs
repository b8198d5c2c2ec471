//! workpulse-cli: command-line client for the Workpulse HTTP API
//!
//! # Subcommands
//! - `upload <files..> --employee-name <n> --employee-pfp <url> --date <d> [--json]`
//! - `sessions [--employee <n>] [--from <d>] [--to <d>] [--json]`
//! - `status`: show server health

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
/// Same ceiling the server enforces; it can only be lowered there.
const MAX_IMAGES: usize = 18;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "workpulse-cli",
    version,
    about = "Upload screenshot batches and browse Workpulse productivity sessions"
)]
struct Cli {
    /// Workpulse HTTP server URL (overrides WORKPULSE_HTTP_URL env var)
    #[arg(long, env = "WORKPULSE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload a batch of screenshots for one work session
    Upload {
        /// Screenshot files, in the order they were taken
        #[arg(required = true)]
        files: Vec<String>,

        #[arg(long)]
        employee_name: String,

        /// Profile picture URL
        #[arg(long, default_value = "")]
        employee_pfp: String,

        /// Session date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List stored sessions grouped by employee
    Sessions {
        /// Only show this employee (case-insensitive)
        #[arg(long)]
        employee: Option<String>,

        /// Earliest session date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Latest session date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Print the filtered rows as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show Workpulse server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Body of a successful `POST /upload`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub summary: String,
    pub verdict: Option<String>,
    pub score: Option<u8>,
    pub image_urls: Vec<String>,
}

/// One row from `GET /sessions`. Unknown columns are ignored and any column
/// may be missing or null.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionRow {
    pub employee_name: Option<String>,
    pub employee_pfp: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub verdict: Option<String>,
    pub score: Option<i64>,
    #[serde(deserialize_with = "null_as_empty")]
    pub image_urls: Vec<String>,
    pub created_at: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SessionRow {
    pub fn employee(&self) -> &str {
        self.employee_name.as_deref().unwrap_or("")
    }

    /// Leading `YYYY-MM-DD` of the `date` column, if it has one.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        let date = self.date.as_deref()?;
        let head = date.get(..10).unwrap_or(date);
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// Guess an image content type from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Rows matching the employee and inclusive date range filters.
///
/// Rows whose date can't be read are dropped only when a date bound is set.
pub fn filter_sessions(
    rows: Vec<SessionRow>,
    employee: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<SessionRow> {
    rows.into_iter()
        .filter(|r| employee.map_or(true, |e| r.employee().eq_ignore_ascii_case(e)))
        .filter(|r| {
            if from.is_none() && to.is_none() {
                return true;
            }
            match r.parsed_date() {
                Some(d) => from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t),
                None => false,
            }
        })
        .collect()
}

/// Group rows by employee name, each group sorted newest first.
pub fn group_by_employee(rows: Vec<SessionRow>) -> BTreeMap<String, Vec<SessionRow>> {
    let mut groups: BTreeMap<String, Vec<SessionRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.employee().to_string()).or_default().push(row);
    }
    for sessions in groups.values_mut() {
        sessions.sort_by(|a, b| {
            b.parsed_date()
                .cmp(&a.parsed_date())
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
    }
    groups
}

fn format_score(score: Option<i64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{}/10", s))
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_upload(
    server: &str,
    files: &[String],
    employee_name: &str,
    employee_pfp: &str,
    date: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    if files.is_empty() || files.len() > MAX_IMAGES {
        bail!("Please upload between 1 and {} images.", MAX_IMAGES);
    }

    let mut form = Form::new()
        .text("employee_name", employee_name.to_string())
        .text("employee_pfp", employee_pfp.to_string())
        .text("date", date.to_string());

    for file in files {
        let content = std::fs::read(file).with_context(|| format!("reading {}", file))?;
        let file_name = Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file)
            .to_string();
        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str(content_type_for(file))?;
        form = form.part("images", part);
    }

    // A batch goes through storage and a vision model in one request.
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let url = format!("{}/upload", server);
    let resp = client
        .post(&url)
        .multipart(form)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        bail!(
            "server returned {}: {}",
            status,
            body["detail"].as_str().unwrap_or("no detail")
        );
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let result: UploadResponse =
        serde_json::from_value(body).context("failed to parse upload response")?;
    println!("Summary: {}", result.summary);
    println!("Verdict: {}", result.verdict.as_deref().unwrap_or("-"));
    println!("Score:   {}", format_score(result.score.map(i64::from)));
    println!("Stored {} image(s)", result.image_urls.len());
    for url in &result.image_urls {
        println!("  {}", url);
    }
    Ok(())
}

fn do_sessions(
    server: &str,
    employee: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!("{}/sessions", server);
    let resp = client
        .get(&url)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;
    if !resp.status().is_success() {
        bail!("server returned {}", resp.status());
    }
    let rows: Vec<SessionRow> = resp.json().context("failed to parse sessions response")?;
    let rows = filter_sessions(rows, employee, from, to);

    if json_output {
        let groups = group_by_employee(rows);
        let flat: Vec<serde_json::Value> = groups
            .values()
            .flatten()
            .map(|r| {
                serde_json::json!({
                    "employee_name": r.employee_name,
                    "employee_pfp": r.employee_pfp,
                    "date": r.date,
                    "summary": r.summary,
                    "verdict": r.verdict,
                    "score": r.score,
                    "image_urls": r.image_urls,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&flat)?);
        return Ok(());
    }

    if rows.is_empty() {
        eprintln!("No sessions found");
        return Ok(());
    }

    for (name, sessions) in group_by_employee(rows) {
        let name = if name.is_empty() { "(unnamed)" } else { name.as_str() };
        println!("{} ({} session(s))", name, sessions.len());
        if let Some(pfp) = sessions
            .iter()
            .find_map(|s| s.employee_pfp.as_deref().filter(|p| !p.is_empty()))
        {
            println!("  photo: {}", pfp);
        }
        for s in &sessions {
            println!(
                "  {}  {:<6}  {}",
                s.date.as_deref().unwrap_or("-"),
                format_score(s.score),
                s.verdict.as_deref().unwrap_or("-")
            );
            if let Some(summary) = s.summary.as_deref().filter(|t| !t.is_empty()) {
                let preview: String = summary.chars().take(120).collect();
                println!("    {}", preview);
            }
        }
        println!();
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {}", url))?;
    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }

    let body: serde_json::Value = resp.json().unwrap_or_default();
    println!("Workpulse server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
    println!("Model:            {}", body["model"].as_str().unwrap_or("?"));
    println!("Bucket:           {}", body["bucket"].as_str().unwrap_or("?"));
    println!("Max images:       {}", body["max_images"]);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Upload {
            files,
            employee_name,
            employee_pfp,
            date,
            json,
        } => do_upload(&server, &files, &employee_name, &employee_pfp, &date, json),
        Commands::Sessions {
            employee,
            from,
            to,
            json,
        } => do_sessions(&server, employee.as_deref(), from, to, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("workpulse-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, date: &str, created_at: &str) -> SessionRow {
        SessionRow {
            employee_name: Some(name.to_string()),
            employee_pfp: None,
            date: Some(date.to_string()),
            summary: Some("Spreadsheets".to_string()),
            verdict: Some("productive".to_string()),
            score: Some(8),
            image_urls: vec![],
            created_at: Some(created_at.to_string()),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_content_type_for_extensions() {
        assert_eq!(content_type_for("a/b/shot.PNG"), "image/png");
        assert_eq!(content_type_for("shot.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("shot.webp"), "image/webp");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn test_parsed_date_accepts_timestamps() {
        assert_eq!(
            row("a", "2026-10-19T09:00:00Z", "").parsed_date(),
            Some(day("2026-10-19"))
        );
        assert_eq!(row("a", "yesterday", "").parsed_date(), None);
    }

    #[test]
    fn test_filter_by_employee_is_case_insensitive() {
        let rows = vec![row("Ada", "2026-10-19", ""), row("Grace", "2026-10-19", "")];
        let out = filter_sessions(rows, Some("ada"), None, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].employee(), "Ada");
    }

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let rows = vec![
            row("Ada", "2026-10-17", ""),
            row("Ada", "2026-10-18", ""),
            row("Ada", "2026-10-19", ""),
            row("Ada", "2026-10-20", ""),
        ];
        let out = filter_sessions(rows, None, Some(day("2026-10-18")), Some(day("2026-10-19")));
        let dates: Vec<&str> = out.iter().map(|r| r.date.as_deref().unwrap()).collect();
        assert_eq!(dates, vec!["2026-10-18", "2026-10-19"]);
    }

    #[test]
    fn test_filter_keeps_undated_rows_without_bounds() {
        let rows = vec![row("Ada", "", "")];
        assert_eq!(filter_sessions(rows.clone(), None, None, None).len(), 1);
        assert!(filter_sessions(rows, None, Some(day("2026-01-01")), None).is_empty());
    }

    #[test]
    fn test_group_sorts_newest_first() {
        let rows = vec![
            row("Ada", "2026-10-17", "2026-10-17T10:00:00Z"),
            row("Grace", "2026-10-18", "2026-10-18T10:00:00Z"),
            row("Ada", "2026-10-19", "2026-10-19T08:00:00Z"),
            row("Ada", "2026-10-19", "2026-10-19T12:00:00Z"),
        ];
        let groups = group_by_employee(rows);

        assert_eq!(groups.len(), 2);
        let ada: Vec<&str> = groups["Ada"]
            .iter()
            .map(|r| r.created_at.as_deref().unwrap())
            .collect();
        assert_eq!(
            ada,
            vec![
                "2026-10-19T12:00:00Z",
                "2026-10-19T08:00:00Z",
                "2026-10-17T10:00:00Z"
            ]
        );
    }

    #[test]
    fn test_session_row_ignores_unknown_columns() {
        let v = serde_json::json!({
            "id": 9,
            "employee_name": "Ada",
            "employee_pfp": "x",
            "date": "2026-10-19",
            "summary": "s",
            "verdict": null,
            "score": null,
            "image_urls": ["u"],
        });
        let r: SessionRow = serde_json::from_value(v).unwrap();
        assert!(r.verdict.is_none());
        assert!(r.score.is_none());
        assert_eq!(r.image_urls, vec!["u".to_string()]);
    }

    #[test]
    fn test_session_row_tolerates_null_columns() {
        let v = serde_json::json!([
            {"employee_name": null, "employee_pfp": null, "date": null,
             "summary": null, "image_urls": null},
            {"employee_name": "Ada", "employee_pfp": "https://cdn.test/ada.png",
             "date": "2026-10-19"}
        ]);
        let rows: Vec<SessionRow> = serde_json::from_value(v).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].employee(), "");
        assert!(rows[0].parsed_date().is_none());
        assert!(rows[0].image_urls.is_empty());
        assert_eq!(rows[1].employee_pfp.as_deref(), Some("https://cdn.test/ada.png"));

        let groups = group_by_employee(filter_sessions(rows, None, None, None));
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(Some(7)), "7/10");
        assert_eq!(format_score(None), "-");
    }
}
