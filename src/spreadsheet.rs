use crate::error::{ImportError, ImportResult};
use crate::models::{HeaderView, SheetSummary};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

const SAMPLE_ROW_COUNT: usize = 5;
const SAMPLE_HEADER_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHeader {
    /// Position in the raw header row; data rows are indexed the same way.
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    /// Position of the sheet in the workbook.
    pub index: usize,
    pub name: String,
    pub headers: Vec<SheetHeader>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Builds a sheet from a raw grid whose first row is the header row.
    ///
    /// Returns `None` when no header cell has text. Every data row is kept, blank ones
    /// included, so row counts match the sheet.
    pub fn from_grid(index: usize, name: &str, grid: Vec<Vec<String>>) -> Option<Sheet> {
        let mut grid = grid.into_iter();
        let header_row = grid.next()?;

        let headers: Vec<SheetHeader> = header_row
            .iter()
            .enumerate()
            .map(|(index, cell)| SheetHeader {
                index,
                name: cell.trim().to_string(),
            })
            .filter(|header| !header.name.is_empty())
            .collect();

        if headers.is_empty() {
            return None;
        }

        let rows = grid.collect();

        let name = match name.trim() {
            "" => format!("Sheet {}", index + 1),
            trimmed => trimmed.to_string(),
        };

        Some(Sheet {
            index,
            name,
            headers,
            rows,
        })
    }

    pub fn header_pairs(&self) -> impl Iterator<Item = (usize, &str)> {
        self.headers.iter().map(|h| (h.index, h.name.as_str()))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn sample_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().take(SAMPLE_ROW_COUNT).cloned().collect()
    }

    pub fn header_views(&self) -> Vec<HeaderView> {
        self.headers
            .iter()
            .map(|h| HeaderView {
                index: h.index,
                name: h.name.clone(),
            })
            .collect()
    }

    pub fn summary(&self) -> SheetSummary {
        SheetSummary {
            index: self.index,
            name: self.name.clone(),
            header_count: self.headers.len(),
            row_count: self.rows.len(),
            sample_headers: self
                .headers
                .iter()
                .take(SAMPLE_HEADER_COUNT)
                .map(|h| h.name.clone())
                .collect(),
        }
    }
}

/// Cell at a header position; short rows read as empty.
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// All importable sheets of one uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpreadsheetDocument {
    sheets: Vec<Sheet>,
}

impl SpreadsheetDocument {
    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.index == index)
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Sheet to map without asking: the only sheet, or one named "Clean".
    pub fn auto_selected_sheet(&self) -> Option<&Sheet> {
        if self.sheets.len() == 1 {
            return self.sheets.first();
        }
        self.sheets
            .iter()
            .find(|sheet| sheet.name.trim().eq_ignore_ascii_case("clean"))
    }

    pub fn summaries(&self) -> Vec<SheetSummary> {
        self.sheets.iter().map(Sheet::summary).collect()
    }
}

pub fn is_supported_extension(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Reads every sheet of a workbook or CSV file.
pub fn read_document(path: &Path) -> ImportResult<SpreadsheetDocument> {
    let file_name = path.to_string_lossy().to_string();
    let document = match extension_of(&file_name).as_deref() {
        Some("csv") => read_csv(path)?,
        Some("xlsx") | Some("xls") | Some("xlsm") | Some("xlsb") | Some("ods") => read_workbook(path)?,
        _ => return Err(ImportError::UnsupportedFile(file_name)),
    };

    info!(
        "Read {}: {} importable sheet(s)",
        file_name,
        document.sheet_count()
    );
    Ok(document)
}

/// [`read_document`] on the blocking pool, for callers on the async runtime.
pub async fn read_document_blocking(path: PathBuf) -> ImportResult<SpreadsheetDocument> {
    tokio::task::spawn_blocking(move || read_document(&path))
        .await
        .map_err(|e| ImportError::Task(e.to_string()))?
}

fn read_workbook(path: &Path) -> ImportResult<SpreadsheetDocument> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_owned();

    let mut sheets = Vec::new();
    for (index, sheet_name) in sheet_names.iter().enumerate() {
        let range = match workbook.worksheet_range(sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!("Skipping unreadable sheet {}: {}", sheet_name, e);
                continue;
            }
        };

        let grid: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        match Sheet::from_grid(index, sheet_name, grid) {
            Some(sheet) => {
                info!(
                    "Sheet {} read: {} headers, {} rows",
                    sheet.name,
                    sheet.headers.len(),
                    sheet.rows.len()
                );
                sheets.push(sheet);
            }
            None => info!("Sheet {} has no headers, skipping", sheet_name),
        }
    }

    Ok(SpreadsheetDocument::from_sheets(sheets))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_csv(path: &Path) -> ImportResult<SpreadsheetDocument> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(str::to_string).collect());
    }

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SpreadsheetDocument::from_sheets(
        Sheet::from_grid(0, &name, grid).into_iter().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn empty_headers_are_filtered_but_indices_kept() {
        let sheet = Sheet::from_grid(
            0,
            "Data",
            grid(&[&[" First Name ", "", "Amount"], &["Ana", "x", "500"]]),
        )
        .unwrap();
        assert_eq!(
            sheet.headers,
            vec![
                SheetHeader { index: 0, name: "First Name".into() },
                SheetHeader { index: 2, name: "Amount".into() },
            ]
        );
        assert_eq!(cell(&sheet.rows[0], 2), "500");
    }

    #[test]
    fn sheet_without_headers_is_not_importable() {
        assert!(Sheet::from_grid(0, "Blank", grid(&[&["", "  "], &["a", "b"]])).is_none());
        assert!(Sheet::from_grid(0, "Nothing", Vec::new()).is_none());
    }

    #[test]
    fn blank_rows_are_kept_and_short_rows_read_empty() {
        let sheet = Sheet::from_grid(
            1,
            "",
            grid(&[&["A", "B"], &["", " "], &["1"]]),
        )
        .unwrap();
        assert_eq!(sheet.name, "Sheet 2");
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(cell(&sheet.rows[0], 0), "");
        assert_eq!(cell(&sheet.rows[1], 1), "");
    }

    #[test]
    fn clean_sheet_is_auto_selected() {
        let raw = grid(&[&["A"], &["1"]]);
        let document = SpreadsheetDocument::from_sheets(vec![
            Sheet::from_grid(0, "Raw", raw.clone()).unwrap(),
            Sheet::from_grid(1, " CLEAN ", raw.clone()).unwrap(),
        ]);
        assert_eq!(document.auto_selected_sheet().map(|s| s.index), Some(1));

        let document = SpreadsheetDocument::from_sheets(vec![
            Sheet::from_grid(0, "Raw", raw.clone()).unwrap(),
            Sheet::from_grid(1, "Other", raw).unwrap(),
        ]);
        assert!(document.auto_selected_sheet().is_none());
    }

    #[test]
    fn extension_allow_list() {
        assert!(is_supported_extension("payout.XLSX"));
        assert!(is_supported_extension("list.csv"));
        assert!(!is_supported_extension("list.pdf"));
        assert!(!is_supported_extension("noextension"));
    }
}
