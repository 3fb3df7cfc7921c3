//! Sheets and their on-disk form: one xlsx workbook plus `report.json`.

use rust_xlsxwriter::{ColNum, Format, Image, RowNum, Workbook as XlsxWorkbook, Worksheet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::charts::Chart;
use crate::error::ReportResult;

/// File name of the workbook.
pub const REPORT_XLSX: &str = "report.xlsx";

/// Name of the JSON bundle holding every sheet.
pub const REPORT_JSON: &str = "report.json";

/// Blank rows between a table and the title of the next one.
const SECTION_GAP: RowNum = 2;

/// One table of the report, optionally followed by more tables and a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    /// Cells are JSON scalars; `null` is a missing value.
    pub rows: Vec<Vec<Value>>,
    /// Titled tables written below this one on the same worksheet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Sheet>,
    #[serde(skip)]
    pub chart: Option<Chart>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            sections: Vec::new(),
            chart: None,
        }
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn with_section(mut self, section: Sheet) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_chart(mut self, chart: Chart) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Cell by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)
    }

    /// File-name-safe form of the sheet name.
    pub fn file_stem(&self) -> String {
        let mut stem = String::new();
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                stem.push(c.to_ascii_lowercase());
            } else if !stem.is_empty() && !stem.ends_with('_') {
                stem.push('_');
            }
        }
        stem.trim_end_matches('_').to_string()
    }

    /// Header row of this table and of each section, with the section title row.
    pub fn layout(&self) -> Vec<(Option<RowNum>, RowNum, &Sheet)> {
        let mut placed = vec![(None, 0, self)];
        let mut next = table_height(self);
        for section in &self.sections {
            let title = next + SECTION_GAP;
            placed.push((Some(title), title + 1, section));
            next = title + 1 + table_height(section);
        }
        placed
    }
}

fn table_height(sheet: &Sheet) -> RowNum {
    1 + sheet.rows.len() as RowNum
}

/// Ordered collection of sheets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sheet: Sheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// A table by name, whether a worksheet or a section of one.
    pub fn table(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .flat_map(|s| std::iter::once(s).chain(&s.sections))
            .find(|s| s.name == name)
    }

    /// Number of tables, sections included.
    pub fn table_count(&self) -> usize {
        self.sheets.iter().map(|s| 1 + s.sections.len()).sum()
    }

    /// Write one worksheet per sheet, embedding the image rendered for it.
    ///
    /// `images` maps a sheet index to its chart image; images are read into
    /// the workbook, so the files can be removed once this returns.
    pub fn write_xlsx(&self, path: &Path, images: &BTreeMap<usize, PathBuf>) -> ReportResult<()> {
        let mut book = XlsxWorkbook::new();
        let bold = Format::new().set_bold();

        for (i, sheet) in self.sheets.iter().enumerate() {
            let ws = book.add_worksheet();
            ws.set_name(&sheet.name)?;

            for (title_row, header_row, table) in sheet.layout() {
                if let Some(row) = title_row {
                    ws.write_string_with_format(row, 0, &table.name, &bold)?;
                }
                write_table(ws, header_row, table, &bold)?;
            }

            if let (Some(chart), Some(image)) = (&sheet.chart, images.get(&i)) {
                let (row, col) = chart.anchor;
                ws.write_string_with_format(row.saturating_sub(1), col, chart.caption(), &bold)?;
                ws.insert_image(row, col, &Image::new(image)?)?;
            }
        }

        book.save(path)?;
        Ok(())
    }

    /// Write the workbook and the JSON bundle into `dir`.
    ///
    /// Returns the written paths, bundle last.
    pub fn write_dir(&self, dir: &Path, images: &BTreeMap<usize, PathBuf>) -> ReportResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let xlsx = dir.join(REPORT_XLSX);
        self.write_xlsx(&xlsx, images)?;

        let bundle = dir.join(REPORT_JSON);
        fs::write(&bundle, serde_json::to_string_pretty(self)?)?;

        Ok(vec![xlsx, bundle])
    }
}

fn write_table(ws: &mut Worksheet, header_row: RowNum, sheet: &Sheet, bold: &Format) -> ReportResult<()> {
    for (col, name) in sheet.columns.iter().enumerate() {
        ws.write_string_with_format(header_row, col as ColNum, name, bold)?;
    }
    for (r, row) in sheet.rows.iter().enumerate() {
        let excel_row = header_row + 1 + r as RowNum;
        for (col, value) in row.iter().enumerate() {
            let col = col as ColNum;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    ws.write_boolean(excel_row, col, *b)?;
                }
                Value::Number(n) => {
                    if let Some(n) = n.as_f64() {
                        ws.write_number(excel_row, col, n)?;
                    }
                }
                Value::String(s) => {
                    ws.write_string(excel_row, col, s)?;
                }
                other => {
                    ws.write_string(excel_row, col, other.to_string())?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn gender_sheet() -> Sheet {
        let mut table = Sheet::new("Gender diff (tables)", &["gender", "n_total"]);
        table.push(vec![json!("Female"), json!(2)]);
        table.push(vec![json!("Male"), json!(2)]);

        let mut ztest = Sheet::new("Two-proportion z-test (Male vs Female)", &["z_stat", "p_value"]);
        ztest.push(vec![json!(-1.0), json!(0.3)]);
        table.with_section(ztest)
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(Sheet::new("Race x Gender (pct)", &[]).file_stem(), "race_x_gender_pct");
        assert_eq!(Sheet::new("Undecl→Decl proportion", &[]).file_stem(), "undecl_decl_proportion");
    }

    #[test]
    fn test_section_placed_below_table() {
        let sheet = gender_sheet();
        let layout = sheet.layout();
        assert_eq!(layout.len(), 2);
        assert_eq!((layout[0].0, layout[0].1), (None, 0));
        // two data rows, two blank rows, then the title
        assert_eq!((layout[1].0, layout[1].1), (Some(5), 6));
    }

    #[test]
    fn test_table_lookup_includes_sections() {
        let mut book = Workbook::new();
        book.add(gender_sheet());
        assert!(book.sheet("Two-proportion z-test (Male vs Female)").is_none());
        assert!(book.table("Two-proportion z-test (Male vs Female)").is_some());
        assert_eq!(book.table_count(), 2);
    }

    #[test]
    fn test_write_dir() {
        let dir = tempdir().unwrap();
        let mut book = Workbook::new();
        let mut sheet = Sheet::new("Persistence rate", &["metric", "value"]);
        sheet.push(vec![json!("total_students"), json!(3)]);
        sheet.push(vec![json!("persistence_rate"), Value::Null]);
        book.add(sheet);
        book.add(gender_sheet());

        let out = dir.path().join("report");
        let paths = book.write_dir(&out, &BTreeMap::new()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with(REPORT_XLSX));

        // xlsx is a zip container
        let xlsx = fs::read(&paths[0]).unwrap();
        assert_eq!(&xlsx[..2], b"PK");

        let bundle: Workbook = serde_json::from_str(&fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(bundle, book);
    }

    #[test]
    fn test_write_xlsx_rejects_bad_sheet_name() {
        let dir = tempdir().unwrap();
        let mut book = Workbook::new();
        book.add(Sheet::new("GPA [by] program", &["program"]));
        assert!(book.write_xlsx(&dir.path().join("bad.xlsx"), &BTreeMap::new()).is_err());
    }
}
