#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use sheet_onboard::{
    error::StoreError,
    payload::{CellValue, TableCreationPayload},
    profile::{ProfileForm, RegistrationRecord},
    sheet::{CSV_MIME, XLSX_MIME},
    store::{TableCreator, TableReader, TableSnapshot, UserRegistry},
    upload::UploadedFile,
};
use tempfile::{TempDir, tempdir};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

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

    pub fn database(&self) -> PathBuf {
        self.path().join("onboard.db")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = fs::File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

pub fn bob_profile() -> ProfileForm {
    ProfileForm {
        first_name: "Bob".into(),
        last_name: "Lee".into(),
        email: "bob@x.com".into(),
        phone: "1234567890".into(),
    }
}

pub fn csv_upload(name: &str, text: &str) -> UploadedFile {
    UploadedFile::new(name, CSV_MIME, text.as_bytes().to_vec())
}

/// Spreadsheet cell used by [`xlsx_bytes`].
#[derive(Debug, Clone)]
pub enum Cell {
    Text(&'static str),
    Number(f64),
    Bool(bool),
    Blank,
}

fn column_letter(idx: usize) -> String {
    let mut idx = idx + 1;
    let mut letters = Vec::new();
    while idx > 0 {
        let rem = (idx - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        idx = (idx - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut body = String::new();
    for (row_idx, row) in rows.iter().enumerate() {
        let r = row_idx + 1;
        body.push_str(&format!("<row r=\"{r}\">"));
        for (col_idx, cell) in row.iter().enumerate() {
            let reference = format!("{}{r}", column_letter(col_idx));
            match cell {
                Cell::Text(text) => body.push_str(&format!(
                    "<c r=\"{reference}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    escape_xml(text)
                )),
                Cell::Number(number) => {
                    body.push_str(&format!("<c r=\"{reference}\"><v>{number}</v></c>"))
                }
                Cell::Bool(flag) => body.push_str(&format!(
                    "<c r=\"{reference}\" t=\"b\"><v>{}</v></c>",
                    u8::from(*flag)
                )),
                Cell::Blank => {}
            }
        }
        body.push_str("</row>");
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
         <sheetData>{body}</sheetData></worksheet>"
    )
}

/// Builds a single-sheet XLSX workbook in memory.
pub fn xlsx_bytes(rows: &[Vec<Cell>]) -> Vec<u8> {
    let parts = [
        (
            "[Content_Types].xml",
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
             <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
             <Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\
             </Types>"
                .to_string(),
        ),
        (
            "_rels/.rels",
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
             <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
             </Relationships>"
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
             xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
             <sheets><sheet name=\"Sheet1\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>"
                .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
             <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>\
             </Relationships>"
                .to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
    ];

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in parts {
            zip.start_file(name, options).expect("start zip entry");
            zip.write_all(contents.as_bytes()).expect("write zip entry");
        }
        zip.finish().expect("finish workbook");
    }
    buffer
}

pub fn xlsx_upload(name: &str, rows: &[Vec<Cell>]) -> UploadedFile {
    UploadedFile::new(name, XLSX_MIME, xlsx_bytes(rows))
}

/// In-memory collaborator double that records every call.
#[derive(Default)]
pub struct RecordingBackend {
    registrations: Mutex<Vec<RegistrationRecord>>,
    payloads: Mutex<Vec<TableCreationPayload>>,
    fail_register: AtomicBool,
    fail_create: AtomicBool,
    hang_create: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_registration(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Makes every table-creation call wait forever.
    pub fn hang_creation(&self, hang: bool) {
        self.hang_create.store(hang, Ordering::SeqCst);
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.registrations.lock().expect("lock").clone()
    }

    pub fn payloads(&self) -> Vec<TableCreationPayload> {
        self.payloads.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UserRegistry for RecordingBackend {
    async fn register(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("registration rejected".into()));
        }
        self.registrations.lock().expect("lock").push(record.clone());
        Ok(())
    }

    async fn find_user(&self, user: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self
            .registrations
            .lock()
            .expect("lock")
            .iter()
            .rev()
            .find(|record| record.first_name == user)
            .cloned())
    }
}

#[async_trait]
impl TableCreator for RecordingBackend {
    async fn create_table(&self, payload: &TableCreationPayload) -> Result<(), StoreError> {
        if self.hang_create.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("creation rejected".into()));
        }
        self.payloads.lock().expect("lock").push(payload.clone());
        Ok(())
    }
}

fn to_json(value: &CellValue) -> serde_json::Value {
    match value {
        CellValue::Null => serde_json::Value::Null,
        CellValue::Number(number) => serde_json::json!(number),
        CellValue::Text(text) => serde_json::Value::String(text.clone()),
    }
}

#[async_trait]
impl TableReader for RecordingBackend {
    async fn list_tables(&self, user: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{user}_");
        let mut names = self
            .payloads
            .lock()
            .expect("lock")
            .iter()
            .map(|payload| payload.table_name.clone())
            .filter(|name| name.starts_with(&prefix))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    async fn read_tables(&self, names: &[String]) -> Result<Vec<TableSnapshot>, StoreError> {
        let payloads = self.payloads.lock().expect("lock");
        let by_name = payloads
            .iter()
            .map(|payload| (payload.table_name.as_str(), payload))
            .collect::<BTreeMap<_, _>>();
        names
            .iter()
            .map(|name| {
                let payload = by_name
                    .get(name.as_str())
                    .ok_or_else(|| StoreError::TableNotFound { name: name.clone() })?;
                let columns = payload
                    .column_names()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                let rows = payload
                    .rows
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .cloned()
                            .zip(row.iter().map(to_json))
                            .collect()
                    })
                    .collect();
                Ok(TableSnapshot {
                    name: name.clone(),
                    columns,
                    rows,
                })
            })
            .collect()
    }
}
