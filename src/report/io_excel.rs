use calamine::{open_workbook_auto, DataType, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{debug, info};
use snafu::prelude::*;

use std::path::Path;

use critique_pipeline::Cell;

use crate::report::{
    EmptyWorkbookSnafu, MissingWorksheetSnafu, OpeningWorkbookSnafu, ReportResult,
    UnsupportedFormatSnafu,
};

/// Reads the raw worksheet as rows of pipeline cells.
///
/// The legacy (.xls) and modern (.xlsx) export formats are told apart by the
/// file extension; anything else is rejected before touching the file.
pub fn read_survey_sheet(path: &str, worksheet_name: Option<&str>) -> ReportResult<Vec<Vec<Cell>>> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ext != "xls" && ext != "xlsx" {
        return UnsupportedFormatSnafu { path }.fail();
    }

    info!("Attempting to read critique export {:?}", path);
    let mut workbook = open_workbook_auto(path).context(OpeningWorkbookSnafu { path })?;

    // A worksheet name was provided, use it. Otherwise take the first one.
    let wrange = match worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { name, path })?
            .context(OpeningWorkbookSnafu { path })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyWorkbookSnafu { path })?
            .context(OpeningWorkbookSnafu { path })?,
    };

    let rows: Vec<Vec<Cell>> = wrange
        .rows()
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();
    debug!("read_survey_sheet: {} raw rows", rows.len());
    Ok(rows)
}

fn convert_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Float(x) => Cell::Number(*x),
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Bool(b) => Cell::Text(b.to_string()),
        DataType::DateTime(serial) => match datetime_from_serial(*serial) {
            Some(dt) => Cell::DateTime(dt),
            None => Cell::Empty,
        },
        _ => Cell::Empty,
    }
}

/// Excel serial timestamps count days, with a fractional time part, from
/// 1899-12-30.
pub(crate) fn datetime_from_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates_decode() {
        let dt = datetime_from_serial(45809.5).unwrap();
        assert_eq!(
            dt,
            NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(datetime_from_serial(-1.0), None);
        assert_eq!(datetime_from_serial(f64::NAN), None);
    }

    #[test]
    fn cells_convert_to_pipeline_values() {
        assert_eq!(
            convert_cell(&DataType::String("Pilot".to_string())),
            Cell::Text("Pilot".to_string())
        );
        assert_eq!(convert_cell(&DataType::Float(4.0)), Cell::Number(4.0));
        assert_eq!(convert_cell(&DataType::Empty), Cell::Empty);
    }
}
