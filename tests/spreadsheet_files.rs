mod common;

use beneficiary_import_hub::error::ImportError;
use beneficiary_import_hub::spreadsheet::{cell, read_document, read_document_blocking};
use common::TestWorkspace;

#[test]
fn workbook_sheets_keep_their_positions() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_xlsx(
        "payout.xlsx",
        &[
            ("Raw", &[&["Notes"], &["scratch"]]),
            ("Empty", &[]),
            (
                "Clean",
                &[
                    &["First Name", "", "Amount", "Date Completed"],
                    &["Ana", "", "500", "44972"],
                    &["", "", "", ""],
                    &["Ben", "x", "250.5", "02/15/2023"],
                ],
            ),
        ],
    );

    let document = read_document(&path).unwrap();
    assert_eq!(document.sheet_count(), 2);
    assert!(document.sheet(1).is_none());

    let clean = document.auto_selected_sheet().expect("clean sheet");
    assert_eq!(clean.index, 2);
    assert_eq!(clean.row_count(), 3);
    let names: Vec<&str> = clean.headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["First Name", "Amount", "Date Completed"]);
    assert_eq!(clean.headers[1].index, 2);
    assert_eq!(cell(&clean.rows[0], 2), "500");
    assert_eq!(cell(&clean.rows[0], 3), "44972");
    assert_eq!(cell(&clean.rows[1], 0), "");
    assert_eq!(cell(&clean.rows[2], 2), "250.5");

    let summaries = document.summaries();
    assert_eq!(summaries[1].sample_headers.len(), 3);
}

#[test]
fn csv_is_a_single_sheet_named_after_the_file() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "march_payout.csv",
        "Surname,Firstname,Amount\nCruz,Ana,500\n,,\nDiaz,Ben\n",
    );

    let document = read_document(&path).unwrap();
    assert_eq!(document.sheet_count(), 1);
    let sheet = document.auto_selected_sheet().unwrap();
    assert_eq!(sheet.name, "march_payout");
    assert_eq!(sheet.row_count(), 3);
    assert_eq!(cell(&sheet.rows[1], 0), "");
    assert_eq!(cell(&sheet.rows[2], 2), "");
}

#[test]
fn unsupported_extension_is_rejected() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("notes.txt", "a,b\n1,2\n");
    assert!(matches!(
        read_document(&path),
        Err(ImportError::UnsupportedFile(_))
    ));
}

#[tokio::test]
async fn blocking_pool_reader_matches_the_direct_reader() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("list.csv", "Surname,Firstname\nCruz,Ana\n");
    let document = read_document_blocking(path.clone()).await.unwrap();
    assert_eq!(document.sheet_count(), 1);
    assert_eq!(cell(&document.sheet(0).unwrap().rows[0], 1), "Ana");

    let notes = workspace.write("notes.txt", "a\n");
    assert!(matches!(
        read_document_blocking(notes).await,
        Err(ImportError::UnsupportedFile(_))
    ));
}

#[test]
fn corrupt_workbook_is_a_spreadsheet_error() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("broken.xlsx", "this is not a zip archive");
    assert!(matches!(
        read_document(&path),
        Err(ImportError::Spreadsheet(_))
    ));
}
