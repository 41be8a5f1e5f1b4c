//! Upserting rows into the sheet, keyed by tournament URL.

use crate::{
    prelude::*,
    rows::Row,
    sheets::{
        self,
        Sheet,
    },
};

pub(crate) const HEADER: [&str; 7] = [
    "Start Date/Time",
    "Name",
    "URL",
    "Country Code",
    "Region Code",
    "Venue Address",
    "Games",
];

/// 1-based, for sorting.
pub(crate) const START_COLUMN: usize = 1;
/// 0-based index into a row's cells.
const URL_CELL: usize = 2;
/// New rows go directly below the header.
const INSERT_ROW: usize = 2;

/// Maps the URL cell of each data row to its physical row number.
#[derive(Debug, Default)]
pub(crate) struct UrlIndex(HashMap<String, usize>);

impl UrlIndex {
    /// Builds the index from the sheet's current values. If a URL appears more than once, the topmost row wins.
    pub(crate) fn new(values: &[Vec<String>]) -> Self {
        let mut index = HashMap::default();
        for (idx, cells) in values.iter().enumerate().skip(1) {
            if let Some(url) = cells.get(URL_CELL).filter(|url| !url.is_empty()) {
                index.entry(url.clone()).or_insert(idx + 1);
            }
        }
        Self(index)
    }

    pub(crate) fn get(&self, url: &str) -> Option<usize> {
        self.0.get(url).copied()
    }

    /// Records a row inserted at `row`, shifting everything at or below it.
    fn insert(&mut self, url: String, row: usize) {
        for existing in self.0.values_mut() {
            if *existing >= row {
                *existing += 1;
            }
        }
        self.0.insert(url, row);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Applied {
    pub(crate) inserted: usize,
    pub(crate) updated: usize,
}

/// Reads the sheet once, writing the header first if the sheet is completely empty.
pub(crate) async fn prepare(sheet: &mut impl Sheet) -> Result<UrlIndex, sheets::Error> {
    let values = sheet.values().await?;
    if values.is_empty() {
        log::info!("sheet is empty, writing header");
        sheet.overwrite_row(1, HEADER.iter().map(|&cell| cell.to_owned()).collect()).await?;
    }
    Ok(UrlIndex::new(&values))
}

/// Overwrites the row with a matching URL if there is one, otherwise inserts a new row below the header.
pub(crate) async fn apply_rows(sheet: &mut impl Sheet, index: &mut UrlIndex, rows: &[Row], timezone: Tz) -> Result<Applied, sheets::Error> {
    let mut applied = Applied::default();
    for row in rows {
        let cells = row.cells(timezone);
        if let Some(existing) = index.get(&row.url) {
            log::debug!("updating row {existing}: {}", row.url);
            sheet.overwrite_row(existing, cells).await?;
            applied.updated += 1;
        } else {
            log::debug!("inserting {}", row.url);
            sheet.insert_row(INSERT_ROW, cells).await?;
            index.insert(row.url.clone(), INSERT_ROW);
            applied.inserted += 1;
        }
    }
    Ok(applied)
}
