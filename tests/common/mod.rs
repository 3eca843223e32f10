#![allow(dead_code)]

use beneficiary_import_hub::database_sea::connect_database;
use beneficiary_import_hub::import_records::{create_import, NewImport};
use beneficiary_import_hub::spreadsheet::{Sheet, SpreadsheetDocument};
use rust_xlsxwriter::Workbook;
use sea_orm::DatabaseConnection;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Fresh in-memory database with the import schema in place.
pub async fn setup_db() -> DatabaseConnection {
    connect_database("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

/// File-backed database for tests that cancel work mid-transaction.
pub async fn setup_file_db(path: &Path) -> DatabaseConnection {
    connect_database(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("file sqlite")
}

pub async fn new_import(db: &DatabaseConnection, tables: &[&str]) -> i32 {
    create_import(
        db,
        NewImport {
            file_name: "fixture.xlsx".to_string(),
            target_tables: tables.iter().map(|t| t.to_string()).collect(),
            ..NewImport::default()
        },
    )
    .await
    .expect("create import")
    .id
}

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

/// Single-sheet document built in memory; the first row is the header row.
pub fn document(rows: &[&[&str]]) -> SpreadsheetDocument {
    let sheet = Sheet::from_grid(0, "Clean", grid(rows)).expect("sheet with headers");
    SpreadsheetDocument::from_sheets(vec![sheet])
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a workbook with one worksheet per `(name, rows)` pair.
    /// Cells that parse as numbers are stored as numbers, like a real export would.
    pub fn write_xlsx(&self, name: &str, sheets: &[(&str, &[&[&str]])]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut workbook = Workbook::new();
        for (sheet_name, rows) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*sheet_name).expect("sheet name");
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let (r, c) = (r as u32, c as u16);
                    match value.parse::<f64>() {
                        Ok(number) => worksheet.write_number(r, c, number),
                        Err(_) => worksheet.write_string(r, c, *value),
                    }
                    .expect("write cell");
                }
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}
