//! Patient summary reports rendered to PDF.
//!
//! A report covers a half-open window `start <= created_at < end` and lays
//! out a header, a vitals table and one block per note on A4 pages.

use std::io::BufWriter;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::{Note, Patient, VitalsReading};

pub const MAX_VITALS_ROWS: usize = 20;

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const LEFT: Mm = Mm(20.0);
const TOP: Mm = Mm(280.0);
const BOTTOM: Mm = Mm(20.0);
const PT_TO_MM: f32 = 0.3528;
const DATE_FORMAT: &str = "%d-%b-%Y";
const DATE_TIME_FORMAT: &str = "%d-%b-%Y %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    #[default]
    Week,
    Month,
    All,
    Custom,
}

impl ReportPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportPeriod::Week => "week",
            ReportPeriod::Month => "month",
            ReportPeriod::All => "all",
            ReportPeriod::Custom => "custom",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub period: ReportPeriod,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportWindow {
    pub start: Option<NaiveDateTime>,
    pub end: NaiveDateTime,
    pub label: String,
}

impl ReportWindow {
    /// Resolves the window for `query` relative to `now`.
    ///
    /// Custom windows run from the start date's midnight up to, but not
    /// including, the midnight after the end date.
    pub fn resolve(query: &ReportQuery, now: NaiveDateTime) -> Result<Self, ApiError> {
        let trailing = |days: i64| {
            let start = now - Duration::days(days);
            ReportWindow {
                start: Some(start),
                end: now,
                label: format!("{} to {}", start.format(DATE_FORMAT), now.format(DATE_FORMAT)),
            }
        };
        match query.period {
            ReportPeriod::Week => Ok(trailing(7)),
            ReportPeriod::Month => Ok(trailing(30)),
            ReportPeriod::All => Ok(ReportWindow {
                start: None,
                end: now,
                label: format!("All records to {}", now.format(DATE_FORMAT)),
            }),
            ReportPeriod::Custom => {
                let given = |raw: &Option<String>| raw.clone().filter(|s| !s.trim().is_empty());
                let (Some(start), Some(end)) = (given(&query.start_date), given(&query.end_date)) else {
                    return Err(ApiError::BadRequest(
                        "Start and End dates required for custom period".into(),
                    ));
                };
                let start = parse_date(&start)?;
                let end = parse_date(&end)?;
                if end < start {
                    return Err(ApiError::BadRequest(
                        "End date must not be before start date".into(),
                    ));
                }
                let end_exclusive = end
                    .succ_opt()
                    .ok_or_else(|| ApiError::BadRequest("End date is out of range".into()))?;
                Ok(ReportWindow {
                    start: Some(start.and_time(chrono::NaiveTime::MIN)),
                    end: end_exclusive.and_time(chrono::NaiveTime::MIN),
                    label: format!("{} to {}", start.format(DATE_FORMAT), end.format(DATE_FORMAT)),
                })
            }
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid date format. Use YYYY-MM-DD".into()))
}

pub fn report_filename(patient: &Patient, period: ReportPeriod) -> String {
    format!("report_{}_{}.pdf", patient.id, period.as_str())
}

/// Which font a run of text needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Primary,
    Devanagari,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRun {
    pub text: String,
    pub script: Script,
}

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

/// Splits text into maximal runs of Devanagari and everything else.
pub fn split_script_runs(text: &str) -> Vec<ScriptRun> {
    let mut runs: Vec<ScriptRun> = Vec::new();
    for c in text.chars() {
        let script = if is_devanagari(c) { Script::Devanagari } else { Script::Primary };
        match runs.last_mut() {
            Some(run) if run.script == script => run.text.push(c),
            _ => runs.push(ScriptRun { text: c.to_string(), script }),
        }
    }
    runs
}

/// Greedy word wrap on character counts. Words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if len > 0 {
                    lines.push(std::mem::take(&mut current));
                    len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if len > 0 && len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
                len = 0;
            }
            if len > 0 {
                current.push(' ');
                len += 1;
            }
            len += word.len();
            current.extend(word);
        }
        if len > 0 {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

/// One row of the vitals table, already formatted.
pub fn vitals_row(v: &VitalsReading) -> [String; 5] {
    let bp = match v.systolic_bp {
        Some(sys) => format!("{}/{}", sys, or_dash(v.diastolic_bp)),
        None => "-".into(),
    };
    [
        v.created_at.format(DATE_TIME_FORMAT).to_string(),
        bp,
        or_dash(v.heart_rate),
        or_dash(v.temperature),
        or_dash(v.spo2),
    ]
}

/// Font data read once at startup.
#[derive(Debug, Default)]
pub struct ReportAssets {
    devanagari_font: Option<Vec<u8>>,
}

impl ReportAssets {
    pub fn load(font_path: &Path) -> Self {
        match std::fs::read(font_path) {
            Ok(bytes) => {
                tracing::info!("Loaded report font {}", font_path.display());
                ReportAssets { devanagari_font: Some(bytes) }
            }
            Err(e) => {
                tracing::warn!(
                    "Report font {} unavailable ({}); Devanagari text will not render",
                    font_path.display(),
                    e
                );
                ReportAssets::default()
            }
        }
    }

    pub fn devanagari_font(&self) -> Option<&[u8]> {
        self.devanagari_font.as_deref()
    }
}

/// Everything a report needs, fetched ahead of rendering.
pub struct ReportData {
    pub patient: Patient,
    /// Notes with their author's name, newest first.
    pub notes: Vec<(Note, String)>,
    /// Readings newest first.
    pub vitals: Vec<VitalsReading>,
    pub window: ReportWindow,
    pub generated_at: NaiveDateTime,
}

#[derive(Clone, Copy)]
enum Weight {
    Regular,
    Bold,
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    y: Mm,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    devanagari: Option<IndirectFontRef>,
}

fn pdf_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::Report(e.to_string())
}

impl PageWriter {
    fn new(title: &str, devanagari_font: Option<&[u8]>) -> Result<Self, ApiError> {
        let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
        let devanagari = match devanagari_font {
            Some(bytes) => match doc.add_external_font(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!("Secondary report font could not be loaded: {}", e);
                    None
                }
            },
            None => None,
        };
        Ok(PageWriter { doc, layer, y: TOP, regular, bold, devanagari })
    }

    fn line_height(size: f32) -> Mm {
        Mm(size * PT_TO_MM * 1.45)
    }

    fn ensure_space(&mut self, needed: Mm) {
        if self.y - needed < BOTTOM {
            let (page, layer) = self.doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }

    fn font_for(&self, weight: Weight, script: Script) -> (&IndirectFontRef, bool) {
        match (script, &self.devanagari) {
            (Script::Devanagari, Some(font)) => (font, true),
            _ => match weight {
                Weight::Regular => (&self.regular, false),
                Weight::Bold => (&self.bold, false),
            },
        }
    }

    /// Writes one line made of differently weighted segments at `x`.
    fn write_segments(&mut self, x: Mm, size: f32, segments: &[(&str, Weight)]) {
        let height = Self::line_height(size);
        self.ensure_space(height);
        self.y -= height;
        self.layer.begin_text_section();
        self.layer.set_text_cursor(x, self.y);
        for (text, weight) in segments {
            for run in split_script_runs(text) {
                let (font, embedded) = self.font_for(*weight, run.script);
                let text = if embedded { run.text } else { builtin_safe(&run.text) };
                self.layer.set_font(font, size);
                self.layer.write_text(text, font);
            }
        }
        self.layer.end_text_section();
    }

    fn write(&mut self, x: Mm, size: f32, weight: Weight, text: &str) {
        self.write_segments(x, size, &[(text, weight)]);
    }

    /// A bold label followed by wrapped regular text.
    fn labelled(&mut self, x: Mm, size: f32, width: usize, label: &str, value: &str) {
        let wrapped = wrap_text(&format!("{label} {value}"), width);
        for (i, line) in wrapped.iter().enumerate() {
            if i == 0 {
                let rest = line.strip_prefix(label).unwrap_or(line);
                self.write_segments(x, size, &[(label, Weight::Bold), (rest, Weight::Regular)]);
            } else {
                self.write(x, size, Weight::Regular, line);
            }
        }
    }

    fn cells(&mut self, columns: &[Mm], size: f32, weight: Weight, values: &[String]) {
        let height = Self::line_height(size);
        self.ensure_space(height);
        let y = self.y - height;
        for (x, value) in columns.iter().zip(values) {
            let text = builtin_safe(value);
            let font = match weight {
                Weight::Regular => &self.regular,
                Weight::Bold => &self.bold,
            };
            self.layer.use_text(text, size, *x, y, font);
        }
        self.y = y;
    }

    fn rule(&mut self) {
        self.ensure_space(Mm(4.0));
        self.y -= Mm(2.0);
        let line = Line {
            points: vec![
                (Point::new(LEFT, self.y), false),
                (Point::new(PAGE_WIDTH - LEFT, self.y), false),
            ],
            is_closed: false,
        };
        self.layer.add_line(line);
        self.y -= Mm(2.0);
    }

    fn gap(&mut self, space: Mm) {
        self.y -= space;
    }

    fn finish(self) -> Result<Vec<u8>, ApiError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(pdf_error)?;
        buf.into_inner().map_err(pdf_error)
    }
}

/// Builtin PDF fonts only cover Latin-1; anything else becomes `?`.
fn builtin_safe(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) < 0x100 && !c.is_control() { c } else { '?' })
        .collect()
}

/// Renders the report. `devanagari_font` is a TrueType font used for
/// Devanagari runs; without it those runs fall back to the builtin font.
pub fn render_pdf(data: &ReportData, devanagari_font: Option<&[u8]>) -> Result<Vec<u8>, ApiError> {
    let mut w = PageWriter::new("Patient Summary Report", devanagari_font)?;

    w.write(LEFT, 18.0, Weight::Bold, "Patient Summary Report");
    w.gap(Mm(4.0));
    w.labelled(LEFT, 10.0, 90, "Patient Name:", &data.patient.name);
    w.labelled(LEFT, 10.0, 90, "Patient ID:", &data.patient.id.to_string());
    w.labelled(LEFT, 10.0, 90, "Period:", &data.window.label);
    w.labelled(
        LEFT,
        10.0,
        90,
        "Generated on:",
        &data.generated_at.format(DATE_TIME_FORMAT).to_string(),
    );
    w.gap(Mm(6.0));

    w.write(LEFT, 14.0, Weight::Bold, "Vitals Summary");
    w.gap(Mm(2.0));
    if data.vitals.is_empty() {
        w.write(LEFT, 10.0, Weight::Regular, "No vitals recorded in this period.");
    } else {
        let columns = [LEFT, Mm(65.0), Mm(100.0), Mm(130.0), Mm(160.0)];
        let header = ["Date", "BP (mmHg)", "Heart Rate", "Temp (F)", "SpO2 (%)"].map(String::from);
        w.cells(&columns, 10.0, Weight::Bold, &header);
        w.rule();
        for reading in data.vitals.iter().take(MAX_VITALS_ROWS) {
            w.cells(&columns, 9.0, Weight::Regular, &vitals_row(reading));
        }
        if data.vitals.len() > MAX_VITALS_ROWS {
            w.write(
                LEFT,
                8.0,
                Weight::Regular,
                &format!(
                    "Showing the {} most recent of {} readings.",
                    MAX_VITALS_ROWS,
                    data.vitals.len()
                ),
            );
        }
    }
    w.gap(Mm(6.0));

    w.write(LEFT, 14.0, Weight::Bold, "Clinical Notes");
    w.gap(Mm(2.0));
    if data.notes.is_empty() {
        w.write(LEFT, 10.0, Weight::Regular, "No notes recorded in this period.");
    }
    for (note, author) in &data.notes {
        let heading = format!(
            "Note by {} on {}",
            author,
            note.created_at.format(DATE_TIME_FORMAT)
        );
        w.write(LEFT, 10.0, Weight::Bold, &heading);
        let fields = [
            ("Assessment:", &note.assessment),
            ("Plan:", &note.plan),
            ("Raw:", &note.raw_notes),
        ];
        for (label, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                w.labelled(Mm(24.0), 9.0, 95, label, value);
            }
        }
        w.rule();
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    fn custom(start: &str, end: &str) -> ReportQuery {
        ReportQuery {
            period: ReportPeriod::Custom,
            start_date: Some(start.into()),
            end_date: Some(end.into()),
        }
    }

    #[test]
    fn custom_window_covers_whole_end_day() {
        let window = ReportWindow::resolve(&custom("2024-01-01", "2024-01-31"), Utc::now().naive_utc())
            .unwrap();
        assert_eq!(window.start, Some(at(2024, 1, 1, 0, 0, 0)));
        assert_eq!(window.end, at(2024, 2, 1, 0, 0, 0));
        assert_eq!(window.label, "01-Jan-2024 to 31-Jan-2024");
    }

    #[test]
    fn custom_window_needs_valid_dates() {
        let now = Utc::now().naive_utc();
        let missing = ReportQuery { period: ReportPeriod::Custom, ..Default::default() };
        assert!(matches!(ReportWindow::resolve(&missing, now), Err(ApiError::BadRequest(_))));
        for blank in [custom("", ""), custom("2024-01-01", "  ")] {
            match ReportWindow::resolve(&blank, now) {
                Err(ApiError::BadRequest(msg)) => {
                    assert_eq!(msg, "Start and End dates required for custom period")
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(ReportWindow::resolve(&custom("2024-13-01", "2024-12-31"), now).is_err());
        assert!(ReportWindow::resolve(&custom("01/01/2024", "2024-01-31"), now).is_err());
        assert!(ReportWindow::resolve(&custom("2024-02-01", "2024-01-31"), now).is_err());
        assert!(ReportWindow::resolve(&custom("2024-01-31", "2024-01-31"), now).is_ok());
    }

    #[test]
    fn preset_windows_trail_now() {
        let now = at(2024, 3, 15, 12, 0, 0);
        let week = ReportWindow::resolve(&ReportQuery::default(), now).unwrap();
        assert_eq!(week.start, Some(at(2024, 3, 8, 12, 0, 0)));
        assert_eq!(week.end, now);

        let month = ReportWindow::resolve(
            &ReportQuery { period: ReportPeriod::Month, ..Default::default() },
            now,
        )
        .unwrap();
        assert_eq!(month.start, Some(at(2024, 2, 14, 12, 0, 0)));

        let all = ReportWindow::resolve(
            &ReportQuery { period: ReportPeriod::All, ..Default::default() },
            now,
        )
        .unwrap();
        assert_eq!(all.start, None);
        assert_eq!(all.end, now);
    }

    #[test]
    fn period_parses_from_query_string() {
        let q: ReportQuery = serde_json::from_str(r#"{"period":"month"}"#).unwrap();
        assert_eq!(q.period, ReportPeriod::Month);
        assert!(serde_json::from_str::<ReportQuery>(r#"{"period":"year"}"#).is_err());
    }

    #[test]
    fn devanagari_runs_are_split_out() {
        let runs = split_script_runs("BP ठीक है today");
        let scripts: Vec<Script> = runs.iter().map(|r| r.script).collect();
        assert_eq!(
            scripts,
            vec![
                Script::Primary,
                Script::Devanagari,
                Script::Primary,
                Script::Devanagari,
                Script::Primary
            ]
        );
        assert_eq!(runs[1].text, "ठीक");
        assert_eq!(runs[4].text, " today");
        assert!(split_script_runs("").is_empty());
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap_text("the quick brown fox jumps", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
        let lines = wrap_text("abcdefghijkl", 5);
        assert_eq!(lines, vec!["abcde", "fghij", "kl"]);
        assert_eq!(wrap_text("", 5), vec![String::new()]);
    }

    #[test]
    fn builtin_text_replaces_unsupported_glyphs() {
        assert_eq!(builtin_safe("Temp 98.6°F"), "Temp 98.6°F");
        assert_eq!(builtin_safe("नमस्ते ok"), "?????? ok");
    }

    fn reading(systolic: Option<i32>) -> VitalsReading {
        VitalsReading {
            id: Uuid::new_v4(),
            physician_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            systolic_bp: systolic,
            diastolic_bp: Some(80),
            heart_rate: None,
            temperature: Some(98.6),
            spo2: Some(97),
            created_at: at(2024, 1, 5, 9, 30, 0),
        }
    }

    #[test]
    fn vitals_row_uses_dashes_for_missing_values() {
        let row = vitals_row(&reading(Some(120)));
        assert_eq!(row, ["05-Jan-2024 09:30", "120/80", "-", "98.6", "97"].map(String::from));
        assert_eq!(vitals_row(&reading(None))[1], "-");
    }

    fn sample_data(notes: usize, vitals: usize) -> ReportData {
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "रमेश Kumar".into(),
            phone_number: "9999999999".into(),
            membership_price: 250.0,
            physician_id: Uuid::new_v4(),
            created_at: at(2024, 1, 1, 8, 0, 0),
        };
        let notes = (0..notes)
            .map(|i| {
                (
                    Note {
                        id: Uuid::new_v4(),
                        physician_id: patient.physician_id,
                        patient_id: patient.id,
                        chief_complaint: Some("Headache".into()),
                        subjective: None,
                        objective: None,
                        assessment: Some(format!("Tension headache, visit {i}")),
                        plan: Some("Rest, fluids. आराम करें".into()),
                        raw_notes: Some("patient reports pain ".repeat(20)),
                        created_at: at(2024, 1, 10, 10, 0, 0),
                    },
                    "Dr. Mehta".to_string(),
                )
            })
            .collect();
        ReportData {
            window: custom_window(),
            patient,
            notes,
            vitals: (0..vitals).map(|_| reading(Some(118))).collect(),
            generated_at: at(2024, 2, 1, 9, 0, 0),
        }
    }

    fn custom_window() -> ReportWindow {
        ReportWindow::resolve(&custom("2024-01-01", "2024-01-31"), at(2024, 2, 1, 0, 0, 0)).unwrap()
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes = render_pdf(&sample_data(2, 3), None).unwrap();
        assert_eq!(&bytes[0..4], b"%PDF");
    }

    #[test]
    fn renders_empty_sections() {
        let bytes = render_pdf(&sample_data(0, 0), None).unwrap();
        assert_eq!(&bytes[0..4], b"%PDF");
    }

    #[test]
    fn long_reports_spill_onto_more_pages() {
        let short = render_pdf(&sample_data(1, 1), None).unwrap();
        let long = render_pdf(&sample_data(40, 50), None).unwrap();
        assert!(long.len() > short.len());
    }

    #[test]
    fn filename_names_patient_and_period() {
        let data = sample_data(0, 0);
        assert_eq!(
            report_filename(&data.patient, ReportPeriod::Custom),
            format!("report_{}_custom.pdf", data.patient.id)
        );
    }
}
