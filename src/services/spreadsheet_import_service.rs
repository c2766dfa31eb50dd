use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::errors::ImportError;
use crate::models::Transaction;
use crate::services::categorizer_service::categorize;
use crate::utils::dates::parse_calendar_date;

/// Extra day formats seen in bank exports, tried after the ISO ones.
const EXPORT_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y/%m/%d", "%m/%d/%y", "%d %b %Y", "%b %d, %Y"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::DateTime(dt) => dt.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map(Cell::DateTime)
                .unwrap_or(Cell::Number(dt.as_f64())),
        }
    }
}

/// First worksheet of an upload: header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Excel,
    Csv,
}

impl SpreadsheetFormat {
    pub fn from_filename(filename: &str) -> Result<Self, ImportError> {
        let lower = filename.trim().to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Ok(SpreadsheetFormat::Excel)
        } else if lower.ends_with(".csv") {
            Ok(SpreadsheetFormat::Csv)
        } else {
            Err(ImportError::UnsupportedFileType)
        }
    }
}

pub fn read_sheet(filename: &str, content: &[u8]) -> Result<Sheet, ImportError> {
    match SpreadsheetFormat::from_filename(filename)? {
        SpreadsheetFormat::Excel => read_excel(content),
        SpreadsheetFormat::Csv => read_csv(content),
    }
}

fn read_excel(content: &[u8]) -> Result<Sheet, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::EmptySheet)?
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or(ImportError::EmptySheet)?
        .iter()
        .map(|c| Cell::from(c).text())
        .collect();

    Ok(Sheet {
        headers,
        rows: rows.map(|r| r.iter().map(Cell::from).collect()).collect(),
    })
}

fn read_csv(content: &[u8]) -> Result<Sheet, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Unreadable(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::EmptySheet);
    }

    let mut rows = Vec::new();
    for (line_num, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(field.to_string())
                        }
                    })
                    .collect(),
            ),
            Err(e) => debug!("Line {}: Failed to parse CSV row: {}", line_num + 2, e),
        }
    }

    Ok(Sheet { headers, rows })
}

// ============================================================================
// COLUMN DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Amount,
    Description,
    Merchant,
    Category,
}

/// Header keywords per field. A header matches a field when it contains any
/// of the keywords; each field takes the first matching header.
const COLUMN_RULES: &[(Field, &[&str])] = &[
    (Field::Date, &["date", "time", "timestamp"]),
    (Field::Amount, &["amount", "value", "price", "cost", "total"]),
    (Field::Description, &["description", "desc", "details", "memo", "note"]),
    (Field::Merchant, &["merchant", "vendor", "store", "business", "company"]),
    (Field::Category, &["category", "cat", "type"]),
];

/// Column index chosen for each field, if any header matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub amount: Option<usize>,
    pub description: Option<usize>,
    pub merchant: Option<usize>,
    pub category: Option<usize>,
}

impl ColumnMap {
    fn slot(&mut self, field: Field) -> &mut Option<usize> {
        match field {
            Field::Date => &mut self.date,
            Field::Amount => &mut self.amount,
            Field::Description => &mut self.description,
            Field::Merchant => &mut self.merchant,
            Field::Category => &mut self.category,
        }
    }
}

pub fn detect_columns(headers: &[String]) -> ColumnMap {
    let mut columns = ColumnMap::default();

    for (index, header) in headers.iter().enumerate() {
        let header = header.trim().to_lowercase();
        for (field, keywords) in COLUMN_RULES {
            let slot = columns.slot(*field);
            if slot.is_none() && keywords.iter().any(|k| header.contains(k)) {
                *slot = Some(index);
            }
        }
    }

    columns
}

// ============================================================================
// ROW PARSING
// ============================================================================

fn parse_date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => {
            let s = s.trim();
            parse_calendar_date(s).ok().or_else(|| {
                EXPORT_DATE_FORMATS
                    .iter()
                    .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
            })
        }
        _ => None,
    }
}

fn parse_amount_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => {
            let cleaned = s.replace(['$', ','], "");
            cleaned.trim().parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

fn optional_text(row: &[Cell], column: Option<usize>) -> Option<String> {
    column
        .and_then(|i| row.get(i))
        .map(Cell::text)
        .filter(|s| !s.is_empty())
}

fn parse_row(row: &[Cell], date_col: usize, amount_col: usize, columns: &ColumnMap) -> Option<Transaction> {
    let date = row.get(date_col).and_then(parse_date_cell)?;
    let amount = row.get(amount_col).and_then(parse_amount_cell)?;

    let description = optional_text(row, columns.description);
    let merchant = optional_text(row, columns.merchant);
    let category = optional_text(row, columns.category).unwrap_or_else(|| {
        categorize(
            description.as_deref().unwrap_or(""),
            merchant.as_deref().unwrap_or(""),
        )
        .to_string()
    });

    Some(Transaction {
        date,
        amount,
        category,
        description,
        merchant,
    })
}

/// Turn sheet rows into categorized transactions.
///
/// A missing date or amount column fails the import; a row whose date or
/// amount cannot be read is skipped.
pub fn extract_transactions(sheet: &Sheet) -> Result<Vec<Transaction>, ImportError> {
    let columns = detect_columns(&sheet.headers);

    let (date_col, amount_col) = match (columns.date, columns.amount) {
        (Some(d), Some(a)) => (d, a),
        (date, amount) => {
            let mut missing = Vec::new();
            if date.is_none() {
                missing.push("date");
            }
            if amount.is_none() {
                missing.push("amount");
            }
            return Err(ImportError::MissingColumns(missing));
        }
    };

    let mut transactions = Vec::with_capacity(sheet.rows.len());
    for (idx, row) in sheet.rows.iter().enumerate() {
        match parse_row(row, date_col, amount_col, &columns) {
            Some(transaction) => transactions.push(transaction),
            None => debug!("Skipping row {}: unreadable date or amount", idx),
        }
    }

    info!(
        "Extracted {} transactions, skipped {} rows",
        transactions.len(),
        sheet.rows.len() - transactions.len()
    );

    Ok(transactions)
}

/// Read an uploaded spreadsheet and return its categorized transactions.
pub fn parse_transactions(filename: &str, content: &[u8]) -> Result<Vec<Transaction>, ImportError> {
    let sheet = read_sheet(filename, content)?;
    extract_transactions(&sheet)
}
