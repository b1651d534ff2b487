//! Batch source: turn an uploaded spreadsheet into ordered name pairs.
//!
//! Accepts OOXML workbooks (`.xlsx`, read with `zip` + `quick-xml`), legacy
//! BIFF workbooks (`.xls`, read with `calamine`) and `.csv` files. Only the
//! first worksheet tab of a workbook is read. The first non-blank row is the header;
//! it must contain an `Original` and a `Duplicates` column, matched
//! case-insensitively. Every later row with at least one non-blank name
//! becomes a [`NamePairRecord`], indexed from 0 in file order.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use persona_dedup_core::models::NamePairRecord;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells to read from the worksheet.
const MAX_CELLS: usize = 1_000_000;
/// Worksheet bounds (column XFD, row 1048576).
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

const ORIGINAL_COLUMN: &str = "original";
const DUPLICATES_COLUMN: &str = "duplicates";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file type '{0}': expected .xlsx, .xls or .csv")]
    UnsupportedFormat(String),

    #[error("could not read spreadsheet: {0}")]
    Xlsx(String),

    #[error("could not read legacy workbook: {0}")]
    Xls(String),

    #[error("could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("file must contain 'Original' and 'Duplicates' columns (found: {})", format_found(.found))]
    MissingColumns { found: Vec<String> },
}

fn format_found(found: &[String]) -> String {
    if found.is_empty() {
        "no named columns".to_string()
    } else {
        found.join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" => Ok(SourceFormat::Xlsx),
            "xls" => Ok(SourceFormat::Xls),
            "csv" => Ok(SourceFormat::Csv),
            _ => Err(SourceError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Read and parse the file at `path`.
pub fn load_records(path: &Path) -> Result<Vec<NamePairRecord>, SourceError> {
    let format = SourceFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_records(&bytes, format)?;
    tracing::info!(
        path = %path.display(),
        rows = records.len(),
        "loaded name pairs"
    );
    Ok(records)
}

pub fn parse_records(bytes: &[u8], format: SourceFormat) -> Result<Vec<NamePairRecord>, SourceError> {
    match format {
        SourceFormat::Xlsx => parse_xlsx(bytes),
        SourceFormat::Xls => parse_xls(bytes),
        SourceFormat::Csv => parse_csv(bytes),
    }
}

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<NamePairRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    records_from_rows(rows)
}

pub fn parse_xlsx(bytes: &[u8]) -> Result<Vec<NamePairRecord>, SourceError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| SourceError::Xlsx(e.to_string()))?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet = first_worksheet_name(&mut archive)?
        .ok_or_else(|| SourceError::Xlsx("workbook has no worksheets".to_string()))?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    let rows = read_sheet_rows(&sheet_xml, &shared_strings)?;
    records_from_rows(rows)
}

/// Read the first worksheet of a BIFF (`.xls`) workbook.
pub fn parse_xls(bytes: &[u8]) -> Result<Vec<NamePairRecord>, SourceError> {
    use calamine::Reader;

    let mut workbook = calamine::Xls::new(std::io::Cursor::new(bytes))
        .map_err(|e| SourceError::Xls(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::Xls("workbook has no worksheets".to_string()))?
        .map_err(|e| SourceError::Xls(e.to_string()))?;
    let rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    records_from_rows(rows)
}

/// Locate the header, then map each following row to a record.
fn records_from_rows(rows: Vec<Vec<String>>) -> Result<Vec<NamePairRecord>, SourceError> {
    let mut rows = rows
        .into_iter()
        .skip_while(|row| row.iter().all(|cell| cell.trim().is_empty()));

    let header: Vec<String> = match rows.next() {
        Some(h) => h
            .iter()
            .map(|cell| cell.trim_start_matches('\u{feff}').trim().to_string())
            .collect(),
        None => return Ok(Vec::new()),
    };

    let find = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (original_col, duplicates_col) = match (find(ORIGINAL_COLUMN), find(DUPLICATES_COLUMN)) {
        (Some(o), Some(d)) => (o, d),
        _ => {
            return Err(SourceError::MissingColumns {
                found: header.into_iter().filter(|h| !h.is_empty()).collect(),
            })
        }
    };

    let cell = |row: &[String], col: usize| {
        row.get(col)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut records = Vec::new();
    for row in rows {
        let original = cell(&row, original_col);
        let duplicate = cell(&row, duplicates_col);
        if original.is_empty() && duplicate.is_empty() {
            continue;
        }
        records.push(NamePairRecord::new(records.len(), original, duplicate));
    }
    Ok(records)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, SourceError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| SourceError::Xlsx(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| SourceError::Xlsx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(SourceError::Xlsx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn has_entry(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

/// Worksheet part behind the first tab of the workbook. Falls back to the
/// lowest-numbered `xl/worksheets/sheetN.xml` when the workbook manifest or
/// its relationships are absent.
fn first_worksheet_name(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Option<String>, SourceError> {
    if let Some(part) = first_tab_part(archive)? {
        if has_entry(archive, &part) {
            return Ok(Some(part));
        }
        tracing::warn!(part = %part, "first sheet part missing from archive");
    }
    Ok(lowest_numbered_sheet(archive))
}

fn first_tab_part(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Option<String>, SourceError> {
    const WORKBOOK: &str = "xl/workbook.xml";
    const RELS: &str = "xl/_rels/workbook.xml.rels";
    if !has_entry(archive, WORKBOOK) || !has_entry(archive, RELS) {
        return Ok(None);
    }
    let workbook = read_zip_entry_bounded(archive, WORKBOOK, MAX_XML_ENTRY_BYTES)?;
    let Some(rel_id) = first_sheet_rel_id(&workbook)? else {
        return Ok(None);
    };
    let rels = read_zip_entry_bounded(archive, RELS, MAX_XML_ENTRY_BYTES)?;
    Ok(relationship_target(&rels, &rel_id)?.map(|target| match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }))
}

/// `r:id` of the first `<sheet>` in `xl/workbook.xml` (tab order).
fn first_sheet_rel_id(xml: &[u8]) -> Result<Option<String>, SourceError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                return Ok(e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
                    .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned()));
            }
            Ok(quick_xml::events::Event::Eof) => return Ok(None),
            Err(e) => return Err(SourceError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn relationship_target(xml: &[u8], id: &str) -> Result<Option<String>, SourceError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attr(&e, b"Id").as_deref() == Some(id) {
                    return Ok(attr(&e, b"Target"));
                }
            }
            Ok(quick_xml::events::Event::Eof) => return Ok(None),
            Err(e) => return Err(SourceError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn lowest_numbered_sheet(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

/// Shared string table. Rich-text runs inside one `<si>` are concatenated;
/// phonetic hints (`<rPh>`) are skipped. A workbook without the table
/// yields an empty list.
fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, SourceError> {
    const ENTRY: &str = "xl/sharedStrings.xml";
    if !has_entry(archive, ENTRY) {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, ENTRY, MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_rph = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_rph = true,
                b"t" if !in_rph => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    let text = te.unescape().map_err(|e| SourceError::Xlsx(e.to_string()))?;
                    s.push_str(&text);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(SourceError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Column number (0-based) from a cell reference such as `"AB12"`.
/// `Ok(None)` when the reference has no column letters.
fn column_index(cell_ref: &str) -> Result<Option<usize>, SourceError> {
    let letters = cell_ref.bytes().take_while(|b| b.is_ascii_alphabetic());
    let mut col = 0usize;
    for b in letters {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|&c| c <= MAX_COLUMNS)
            .ok_or_else(|| {
                SourceError::Xlsx(format!("cell reference {} is beyond the last column", cell_ref))
            })?;
    }
    Ok(col.checked_sub(1))
}

#[derive(Default)]
struct PendingCell {
    col: usize,
    kind: Vec<u8>,
    value: String,
    inline: String,
}

impl PendingCell {
    fn resolve(self, shared_strings: &[String]) -> String {
        match self.kind.as_slice() {
            b"s" => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i).cloned())
                .unwrap_or_default(),
            b"inlineStr" => self.inline,
            b"b" => match self.value.trim() {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                other => other.to_string(),
            },
            _ => self.value,
        }
    }
}

/// Read the worksheet into dense rows. Gaps left by empty cells and
/// skipped row numbers are filled with empty strings / empty rows.
fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, SourceError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_inline_t = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= MAX_CELLS {
            tracing::warn!(limit = MAX_CELLS, "worksheet cell limit reached; ignoring the rest");
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    let n = attr(&e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .unwrap_or(rows.len() + 1);
                    if n > MAX_ROWS {
                        return Err(SourceError::Xlsx(format!(
                            "row {} is beyond the last worksheet row",
                            n
                        )));
                    }
                    while rows.len() + 1 < n {
                        rows.push(Vec::new());
                    }
                    row = Some(Vec::new());
                }
                b"c" => {
                    let next_col = row.as_ref().map(|r| r.len()).unwrap_or(0);
                    let col = match attr(&e, b"r") {
                        Some(r) => column_index(&r)?.unwrap_or(next_col),
                        None => next_col,
                    };
                    if col >= MAX_COLUMNS {
                        return Err(SourceError::Xlsx(format!(
                            "column {} is beyond the last worksheet column",
                            col + 1
                        )));
                    }
                    cell = Some(PendingCell {
                        col,
                        kind: attr(&e, b"t").map(|t| t.into_bytes()).unwrap_or_default(),
                        ..PendingCell::default()
                    });
                }
                b"v" => in_v = true,
                b"t" if cell.is_some() => in_inline_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v || in_inline_t => {
                if let Some(c) = cell.as_mut() {
                    let text = te.unescape().map_err(|e| SourceError::Xlsx(e.to_string()))?;
                    if in_v {
                        c.value.push_str(&text);
                    } else {
                        c.inline.push_str(&text);
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => {
                    if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                        let col = c.col;
                        let value = c.resolve(shared_strings);
                        if r.len() <= col {
                            r.resize(col + 1, String::new());
                        }
                        r[col] = value;
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(SourceError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn attr(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned())
}
