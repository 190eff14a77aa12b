use anyhow::Context;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use calamine::{Data, Reader, Xlsx};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

use crate::backend::{AppState, Backend, BackendError};
use crate::problems::{
    bulk_create_problems, bulk_create_selects, NewProblem, NewProblemSelect,
};
use crate::progresses::{create_progress, fetch_progresses, ProgressPayload};
use crate::subjects::fetch_subjects;
use crate::uploads::{collect_form, UploadError, UploadedFile};

// Header aliases per logical field. Sheets come from several authors, so
// both the Korean and English spellings are accepted.
const PROGRESS_NAME: &[&str] = &["진도", "진도명", "name", "progress"];
const SUBJECT_NAME: &[&str] = &["과목명", "과목", "subject"];
const DAY: &[&str] = &["day", "Day", "일차"];
const DIFFICULTY: &[&str] = &["난이도", "difficulty"];
const PROBLEM_CONTENT: &[&str] = &["problem", "문제"];
const ANSWER: &[&str] = &["answer", "정답"];
const EXPLANATION: &[&str] = &["explanation", "해설"];
const EXAM_YEAR: &[&str] = &["exam_year", "출제년도"];
const CHOICES: [[&str; 2]; 5] = [
    ["choice1", "보기1"],
    ["choice2", "보기2"],
    ["choice3", "보기3"],
    ["choice4", "보기4"],
    ["choice5", "보기5"],
];

fn map_difficulty(raw: &str) -> Option<&'static str> {
    match raw.trim() {
        "기본" => Some("basic"),
        "심화" => Some("advanced"),
        _ => None,
    }
}

/// One spreadsheet row, keyed by the header row. `line` is the 1-based
/// line in the uploaded file (header is line 1).
#[derive(Debug, Clone)]
pub struct SheetRow {
    pub line: usize,
    cells: HashMap<String, String>,
}

impl SheetRow {
    fn field(&self, aliases: &[&str]) -> Option<&str> {
        for alias in aliases {
            if let Some(value) = self.cells.get(*alias) {
                if !value.trim().is_empty() {
                    return Some(value.as_str());
                }
            }
        }
        None
    }

    fn numeric(&self, aliases: &[&str]) -> Option<i64> {
        self.field(aliases).and_then(|v| v.trim().parse::<i64>().ok())
    }
}

#[derive(Serialize, Debug, Default)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: Vec<SkippedRow>,
    pub message: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug)]
pub enum ImportError {
    MissingFile,
    InvalidFile(String),
    BulkMismatch { submitted: usize, created: usize },
    Backend(BackendError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportError::MissingFile => write!(f, "No file in upload"),
            ImportError::InvalidFile(msg) => write!(f, "Invalid import file: {}", msg),
            ImportError::BulkMismatch { submitted, created } => write!(
                f,
                "Bulk create returned {} records for {} submitted rows",
                created, submitted
            ),
            ImportError::Backend(e) => write!(f, "{}", e),
        }
    }
}

impl From<BackendError> for ImportError {
    fn from(e: BackendError) -> Self {
        ImportError::Backend(e)
    }
}

impl From<UploadError> for ImportError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Backend(inner) => ImportError::Backend(inner),
            UploadError::MissingFile => ImportError::MissingFile,
            UploadError::InvalidForm(msg) => ImportError::InvalidFile(msg),
        }
    }
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        match self {
            ImportError::MissingFile => {
                (StatusCode::BAD_REQUEST, "No file in upload").into_response()
            }
            ImportError::InvalidFile(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid import file: {}", msg)).into_response()
            }
            ImportError::BulkMismatch { .. } => {
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
            ImportError::Backend(e) => e.into_response(),
        }
    }
}

// --- Sheet parsing ---

pub fn parse_sheet(file: &UploadedFile) -> Result<Vec<SheetRow>, anyhow::Error> {
    let name = file.name.to_lowercase();
    if name.ends_with(".csv") {
        parse_csv(&file.bytes).context("Failed to parse CSV file")
    } else if name.ends_with(".xlsx") {
        parse_xlsx(&file.bytes).context("Failed to parse XLSX workbook")
    } else {
        Err(anyhow::anyhow!(
            "Unsupported file type: {} (expected .csv or .xlsx)",
            file.name
        ))
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<SheetRow>, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let mut cells = HashMap::new();
        for (j, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            cells.insert(header.clone(), record.get(j).unwrap_or("").to_string());
        }
        rows.push(SheetRow { line: i + 2, cells });
    }
    Ok(rows)
}

fn parse_xlsx(bytes: &[u8]) -> Result<Vec<SheetRow>, anyhow::Error> {
    let mut workbook = Xlsx::new(Cursor::new(bytes)).context("Failed to open workbook")?;
    // Sheet selection is always "first sheet in workbook".
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow::anyhow!("Workbook has no sheets"))?
        .context("Failed to read first sheet")?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| cell_to_string(c).trim().to_string())
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (i, data_row) in row_iter.enumerate() {
        let mut cells = HashMap::new();
        for (j, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = data_row.get(j).map(cell_to_string).unwrap_or_default();
            cells.insert(header.clone(), value);
        }
        rows.push(SheetRow { line: i + 2, cells });
    }
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        // Excel stores every number as a float; "3.0" should import as "3".
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

// --- Row mapping ---

/// Name lookups are exact-match on trimmed strings; there is no fuzzy
/// matching, and resolution failures skip the row rather than abort the
/// run.
fn subject_lookup(subjects: &[crate::subjects::Subject]) -> HashMap<String, i64> {
    subjects
        .iter()
        .map(|s| (s.name.trim().to_string(), s.id))
        .collect()
}

fn progress_lookup(
    progresses: &[crate::progresses::Progress],
) -> HashMap<String, (i64, Option<i64>)> {
    progresses
        .iter()
        .map(|p| (p.name.trim().to_string(), (p.id, p.subject)))
        .collect()
}

pub fn map_progress_row(
    row: &SheetRow,
    subjects: &HashMap<String, i64>,
) -> Result<ProgressPayload, String> {
    let name = row
        .field(PROGRESS_NAME)
        .ok_or("missing progress name")?
        .trim()
        .to_string();
    let day = row.numeric(DAY).ok_or("missing or non-numeric day")?;
    let difficulty = row
        .field(DIFFICULTY)
        .and_then(map_difficulty)
        .map(String::from);
    let subject = match row.field(SUBJECT_NAME) {
        Some(raw) => Some(
            *subjects
                .get(raw.trim())
                .ok_or_else(|| format!("unknown subject: {}", raw.trim()))?,
        ),
        None => None,
    };

    Ok(ProgressPayload {
        name,
        day: Some(day),
        difficulty,
        subject,
    })
}

#[derive(Debug)]
pub struct MappedProblem {
    pub new: NewProblem,
    pub choices: Vec<String>,
}

pub fn map_problem_row(
    row: &SheetRow,
    sequence: i64,
    subjects: &HashMap<String, i64>,
    progresses: &HashMap<String, (i64, Option<i64>)>,
) -> Result<MappedProblem, String> {
    let subject_raw = row.field(SUBJECT_NAME).ok_or("missing subject")?;
    let subject_id = *subjects
        .get(subject_raw.trim())
        .ok_or_else(|| format!("unknown subject: {}", subject_raw.trim()))?;

    let progress_raw = row.field(PROGRESS_NAME).ok_or("missing progress")?;
    let (progress_id, progress_subject) = *progresses
        .get(progress_raw.trim())
        .ok_or_else(|| format!("unknown progress: {}", progress_raw.trim()))?;
    if let Some(owner) = progress_subject {
        if owner != subject_id {
            return Err(format!(
                "progress {} does not belong to subject {}",
                progress_raw.trim(),
                subject_raw.trim()
            ));
        }
    }

    let content = row
        .field(PROBLEM_CONTENT)
        .ok_or("missing problem content")?
        .trim()
        .to_string();
    let answer = row.numeric(ANSWER).ok_or("missing or non-numeric answer")?;

    let choices: Vec<String> = CHOICES
        .iter()
        .filter_map(|aliases| row.field(aliases).map(|v| v.trim().to_string()))
        .collect();
    // Objective problems need a real choice set; short-answer rows carry
    // none at all.
    if choices.len() == 1 {
        return Err("needs at least two choices".to_string());
    }

    Ok(MappedProblem {
        new: NewProblem {
            progress: progress_id,
            problem: content,
            answer,
            explanation: row.field(EXPLANATION).map(|s| s.trim().to_string()),
            exam_year: row.numeric(EXAM_YEAR),
            difficulty: row
                .field(DIFFICULTY)
                .and_then(map_difficulty)
                .map(String::from),
            sequence,
        },
        choices,
    })
}

// --- Import runs ---

pub async fn run_progress_import(
    backend: &Backend,
    file: &UploadedFile,
) -> Result<ImportReport, ImportError> {
    let rows = parse_sheet(file).map_err(|e| ImportError::InvalidFile(e.to_string()))?;
    log::info!("Parsed {} progress rows from {}", rows.len(), file.name);

    let subjects_page = fetch_subjects(backend).await?;
    let subjects = subject_lookup(&subjects_page.items);

    let mut report = ImportReport::default();
    // One POST per row, in file order.
    for row in &rows {
        match map_progress_row(row, &subjects) {
            Ok(payload) => match create_progress(backend, &payload).await {
                Ok(_) => report.created += 1,
                Err(e) => {
                    log::warn!("Row {} rejected by backend: {}", row.line, e);
                    report.skipped.push(SkippedRow {
                        row: row.line,
                        reason: e.to_string(),
                    });
                }
            },
            Err(reason) => {
                log::warn!("Row {} skipped: {}", row.line, reason);
                report.skipped.push(SkippedRow {
                    row: row.line,
                    reason,
                });
            }
        }
    }

    report.message = format!("{} items uploaded", report.created);
    Ok(report)
}

pub async fn run_problem_import(
    backend: &Backend,
    file: &UploadedFile,
) -> Result<ImportReport, ImportError> {
    let rows = parse_sheet(file).map_err(|e| ImportError::InvalidFile(e.to_string()))?;
    log::info!("Parsed {} problem rows from {}", rows.len(), file.name);

    let (subjects_page, progresses_page) =
        tokio::try_join!(fetch_subjects(backend), fetch_progresses(backend))?;
    let subjects = subject_lookup(&subjects_page.items);
    let progresses = progress_lookup(&progresses_page.items);

    let mut report = ImportReport::default();
    let mut mapped = Vec::new();
    for row in &rows {
        let sequence = mapped.len() as i64 + 1;
        match map_problem_row(row, sequence, &subjects, &progresses) {
            Ok(m) => mapped.push(m),
            Err(reason) => {
                log::warn!("Row {} skipped: {}", row.line, reason);
                report.skipped.push(SkippedRow {
                    row: row.line,
                    reason,
                });
            }
        }
    }

    if mapped.is_empty() {
        report.message = "0 items uploaded".to_string();
        return Ok(report);
    }

    let new_problems: Vec<NewProblem> = mapped.iter().map(|m| m.new.clone()).collect();
    let created = bulk_create_problems(backend, &new_problems).await?;

    // Choice rows are attached to the created problems by array position,
    // so a short or reordered bulk response must abort instead of
    // misattaching choices to the wrong problems.
    if created.len() != mapped.len() {
        log::error!(
            "Bulk create answered {} records for {} rows, aborting choice attach",
            created.len(),
            mapped.len()
        );
        return Err(ImportError::BulkMismatch {
            submitted: mapped.len(),
            created: created.len(),
        });
    }

    let mut selects = Vec::new();
    for (problem, m) in created.iter().zip(&mapped) {
        for (j, choice) in m.choices.iter().enumerate() {
            selects.push(NewProblemSelect {
                problem: problem.id,
                content: choice.clone(),
                sequence: j as i64 + 1,
            });
        }
    }
    if !selects.is_empty() {
        bulk_create_selects(backend, &selects).await?;
    }

    report.created = created.len();
    report.message = format!("{} items uploaded", report.created);
    Ok(report)
}

// --- Routes ---

async fn import_progresses(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ImportError> {
    let (_fields, file) = collect_form(&mut multipart).await?;
    let file = file.ok_or(ImportError::MissingFile)?;
    log::info!("Progress import: {} ({} bytes)", file.name, file.bytes.len());

    let report = run_progress_import(&state.backend, &file).await?;
    log::info!(
        "Progress import done: {} created, {} skipped",
        report.created,
        report.skipped.len()
    );
    Ok(Json(report))
}

async fn import_problems(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ImportError> {
    let (_fields, file) = collect_form(&mut multipart).await?;
    let file = file.ok_or(ImportError::MissingFile)?;
    log::info!("Problem import: {} ({} bytes)", file.name, file.bytes.len());

    let report = run_problem_import(&state.backend, &file).await?;
    log::info!(
        "Problem import done: {} created, {} skipped",
        report.created,
        report.skipped.len()
    );
    Ok(Json(report))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/imports/progresses", post(import_progresses))
        .route("/imports/problems", post(import_problems))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::db;
    use axum_test::multipart::{MultipartForm, Part as TestPart};
    use axum_test::TestServer;
    use httpmock::MockServer;
    use serde_json::json;

    async fn test_state(server: &MockServer) -> AppState {
        let pool = db::create_test_pool().await;
        let backend = Backend::new(&server.base_url(), TokenStore::new(pool.clone()));
        AppState { pool, backend }
    }

    fn csv_file(name: &str, content: &str) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            content_type: "text/csv".to_string(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        SheetRow {
            line: 2,
            cells: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_difficulty_mapping_is_total() {
        assert_eq!(map_difficulty("기본"), Some("basic"));
        assert_eq!(map_difficulty(" 심화 "), Some("advanced"));
        assert_eq!(map_difficulty("중급"), None);
        assert_eq!(map_difficulty(""), None);
    }

    #[test]
    fn test_numeric_coercion() {
        let r = row(&[("day", "3")]);
        assert_eq!(r.numeric(DAY), Some(3));

        let r = row(&[("day", "abc")]);
        assert_eq!(r.numeric(DAY), None);

        let r = row(&[("Day", " 7 ")]);
        assert_eq!(r.numeric(DAY), Some(7));
    }

    #[test]
    fn test_progress_row_header_aliases() {
        let subjects = HashMap::from([("해부학".to_string(), 1)]);

        let r = row(&[("진도명", "1일차 해부학"), ("Day", "1"), ("난이도", "기본")]);
        let payload = map_progress_row(&r, &subjects).unwrap();
        assert_eq!(payload.name, "1일차 해부학");
        assert_eq!(payload.day, Some(1));
        assert_eq!(payload.difficulty.as_deref(), Some("basic"));
        assert_eq!(payload.subject, None);
    }

    #[test]
    fn test_progress_row_unknown_difficulty_is_omitted() {
        let subjects = HashMap::new();
        let r = row(&[("name", "2일차"), ("day", "2"), ("난이도", "매우심화")]);
        let payload = map_progress_row(&r, &subjects).unwrap();
        assert_eq!(payload.difficulty, None);
    }

    #[test]
    fn test_progress_row_missing_day_is_skipped() {
        let subjects = HashMap::new();
        let r = row(&[("진도", "3일차")]);
        assert!(map_progress_row(&r, &subjects).is_err());
    }

    #[test]
    fn test_progress_row_subject_resolution_is_exact_match() {
        let subjects = HashMap::from([("해부학".to_string(), 1)]);

        // Trimmed exact match resolves.
        let r = row(&[("진도", "1일차"), ("day", "1"), ("과목명", " 해부학 ")]);
        let payload = map_progress_row(&r, &subjects).unwrap();
        assert_eq!(payload.subject, Some(1));

        // Anything else skips the row, it never raises.
        let r = row(&[("진도", "1일차"), ("day", "1"), ("과목명", "해부")]);
        let err = map_progress_row(&r, &subjects).unwrap_err();
        assert!(err.contains("unknown subject"));
    }

    #[test]
    fn test_problem_row_single_choice_rejected() {
        let subjects = HashMap::from([("해부학".to_string(), 1)]);
        let progresses = HashMap::from([("1일차".to_string(), (4, Some(1)))]);

        let r = row(&[
            ("subject", "해부학"),
            ("진도", "1일차"),
            ("문제", "어깨뼈의 영문명은?"),
            ("정답", "1"),
            ("보기1", "scapula"),
        ]);
        let err = map_problem_row(&r, 1, &subjects, &progresses).unwrap_err();
        assert!(err.contains("at least two choices"));
    }

    #[test]
    fn test_problem_row_no_choices_is_short_answer() {
        let subjects = HashMap::from([("해부학".to_string(), 1)]);
        let progresses = HashMap::from([("1일차".to_string(), (4, Some(1)))]);

        let r = row(&[
            ("subject", "해부학"),
            ("진도", "1일차"),
            ("problem", "늑골은 몇 쌍인가?"),
            ("answer", "12"),
        ]);
        let mapped = map_problem_row(&r, 1, &subjects, &progresses).unwrap();
        assert!(mapped.choices.is_empty());
        assert_eq!(mapped.new.answer, 12);
    }

    #[test]
    fn test_parse_csv_korean_headers() {
        let file = csv_file(
            "progress.csv",
            "진도,day,난이도,과목명\n1일차 해부학,1,기본,해부학\n2일차 해부학,2,심화,해부학\n",
        );
        let rows = parse_sheet(&file).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].field(PROGRESS_NAME), Some("1일차 해부학"));
        assert_eq!(rows[1].numeric(DAY), Some(2));
    }

    #[test]
    fn test_parse_sheet_unknown_extension() {
        let file = csv_file("rows.txt", "a,b\n1,2\n");
        assert!(parse_sheet(&file).is_err());
    }

    #[tokio::test]
    async fn test_progress_import_end_to_end_skips_invalid_row() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([{"id": 1, "name": "해부학"}]));
        });
        let create = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/admin/progresses/");
            then.status(201).json_body(json!({"id": 10, "name": "x", "day": 1}));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        // Row 3 has no day and must be skipped; the run still succeeds.
        let csv = "진도,day,난이도,과목명\n\
                   1일차 해부학,1,기본,해부학\n\
                   2일차 해부학,,기본,해부학\n\
                   3일차 해부학,3,심화,해부학\n";
        let form = MultipartForm::new().add_part(
            "file",
            TestPart::bytes(csv.as_bytes().to_vec())
                .file_name("progress.csv")
                .mime_type("text/csv"),
        );
        let response = server.post("/imports/progresses").multipart(form).await;

        response.assert_status(StatusCode::OK);
        create.assert_hits(2);
        let report: serde_json::Value = response.json();
        assert_eq!(report["created"], json!(2));
        assert_eq!(report["message"], json!("2 items uploaded"));
        assert_eq!(report["skipped"][0]["row"], json!(3));
    }

    #[tokio::test]
    async fn test_problem_import_correlates_choices_by_position() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([{"id": 1, "name": "해부학"}]));
        });
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/progresses/");
            then.status(200).json_body(json!({
                "count": 1, "next": null, "previous": null,
                "results": [{"id": 4, "name": "1일차", "subject": 1}]
            }));
        });
        let bulk_problems = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/problems/bulk_create/");
            then.status(201).json_body(json!([
                {"id": 101, "progress": 4, "problem": "문제A", "answer": 1, "sequence": 1},
                {"id": 102, "progress": 4, "problem": "문제B", "answer": 2, "sequence": 2},
                {"id": 103, "progress": 4, "problem": "문제C", "answer": 12, "sequence": 3}
            ]));
        });
        // Five choice rows across the three problems, tagged with the
        // created ids by original row position: {2, 3, 0}.
        let bulk_selects = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/problem-selects/bulk_create/")
                .json_body(json!([
                    {"problem": 101, "content": "가", "sequence": 1},
                    {"problem": 101, "content": "나", "sequence": 2},
                    {"problem": 102, "content": "ㄱ", "sequence": 1},
                    {"problem": 102, "content": "ㄴ", "sequence": 2},
                    {"problem": 102, "content": "ㄷ", "sequence": 3}
                ]));
            then.status(201).json_body(json!([
                {"id": 201, "problem": 101, "content": "가", "sequence": 1},
                {"id": 202, "problem": 101, "content": "나", "sequence": 2},
                {"id": 203, "problem": 102, "content": "ㄱ", "sequence": 1},
                {"id": 204, "problem": 102, "content": "ㄴ", "sequence": 2},
                {"id": 205, "problem": 102, "content": "ㄷ", "sequence": 3}
            ]));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let csv = "subject,진도,문제,정답,보기1,보기2,보기3\n\
                   해부학,1일차,문제A,1,가,나,\n\
                   해부학,1일차,문제B,2,ㄱ,ㄴ,ㄷ\n\
                   해부학,1일차,문제C,12,,,\n";
        let form = MultipartForm::new().add_part(
            "file",
            TestPart::bytes(csv.as_bytes().to_vec())
                .file_name("problems.csv")
                .mime_type("text/csv"),
        );
        let response = server.post("/imports/problems").multipart(form).await;

        response.assert_status(StatusCode::OK);
        bulk_problems.assert();
        bulk_selects.assert();
        let report: serde_json::Value = response.json();
        assert_eq!(report["created"], json!(3));
        assert_eq!(report["message"], json!("3 items uploaded"));
    }

    #[tokio::test]
    async fn test_problem_import_unresolved_progress_is_skipped() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([{"id": 1, "name": "해부학"}]));
        });
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/progresses/");
            then.status(200).json_body(json!({
                "count": 1, "next": null, "previous": null,
                "results": [{"id": 4, "name": "1일차", "subject": 1}]
            }));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let csv = "subject,진도,문제,정답,보기1,보기2\n\
                   해부학,99일차,문제A,1,가,나\n";
        let form = MultipartForm::new().add_part(
            "file",
            TestPart::bytes(csv.as_bytes().to_vec())
                .file_name("problems.csv")
                .mime_type("text/csv"),
        );
        let response = server.post("/imports/problems").multipart(form).await;

        // Nothing to submit: the bulk endpoints are never called.
        response.assert_status(StatusCode::OK);
        let report: serde_json::Value = response.json();
        assert_eq!(report["created"], json!(0));
        assert_eq!(report["message"], json!("0 items uploaded"));
        assert_eq!(report["skipped"][0]["row"], json!(2));
    }

    #[tokio::test]
    async fn test_problem_import_aborts_on_bulk_count_mismatch() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([{"id": 1, "name": "해부학"}]));
        });
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/progresses/");
            then.status(200).json_body(json!({
                "count": 1, "next": null, "previous": null,
                "results": [{"id": 4, "name": "1일차", "subject": 1}]
            }));
        });
        // Backend drops one row instead of failing the whole call.
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/problems/bulk_create/");
            then.status(201).json_body(json!([
                {"id": 101, "progress": 4, "problem": "문제A", "answer": 1}
            ]));
        });
        let bulk_selects = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/problem-selects/bulk_create/");
            then.status(201).json_body(json!([]));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let csv = "subject,진도,문제,정답,보기1,보기2\n\
                   해부학,1일차,문제A,1,가,나\n\
                   해부학,1일차,문제B,2,ㄱ,ㄴ\n";
        let form = MultipartForm::new().add_part(
            "file",
            TestPart::bytes(csv.as_bytes().to_vec())
                .file_name("problems.csv")
                .mime_type("text/csv"),
        );
        let response = server.post("/imports/problems").multipart(form).await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        bulk_selects.assert_hits(0);
    }
}
