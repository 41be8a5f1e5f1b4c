//! Utilities for working with Google Sheets.

use {
    serde_json::json,
    yup_oauth2::{
        ServiceAccountAuthenticator,
        ServiceAccountKey,
        read_service_account_key,
    },
    crate::prelude::*,
};

const BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// from <https://developers.google.com/sheets/api/limits#quota>:
///
/// > Read requests […] Per minute per user per project […] 60
const RATE_LIMIT: Duration = Duration::from_secs(1);

/// The columns this crate reads and writes.
const FIRST_COLUMN: &str = "A";
const LAST_COLUMN: &str = "G";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] OAuth(#[from] yup_oauth2::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("failed to read service account key from {}: {source}", path.display())]
    ServiceAccountKey {
        source: io::Error,
        path: PathBuf,
    },
    #[error("failed to build service account authenticator: {0}")]
    Authenticator(#[source] io::Error),
    #[error("empty token is not valid")]
    EmptyToken,
    #[error("OAuth token is expired")]
    TokenExpired,
    #[error("spreadsheet has no sheet named {0:?}")]
    NoSuchSheet(String),
}

/// A single sheet of a spreadsheet. Rows and columns are 1-based, as displayed in the spreadsheet UI.
#[async_trait]
pub(crate) trait Sheet {
    /// Formatted cell values of all rows, including the header.
    async fn values(&mut self) -> Result<Vec<Vec<String>>, Error>;
    /// Replaces the contents of an existing row.
    async fn overwrite_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error>;
    /// Inserts a new row at the given position, shifting that row and everything below it down by one.
    async fn insert_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error>;
    async fn freeze_header(&mut self) -> Result<(), Error>;
    /// Sorts all rows below the header ascending by the given column.
    async fn sort_by_column(&mut self, column: usize) -> Result<(), Error>;
}

/// An A1 range on the named sheet, with the sheet name quoted.
fn a1_range(sheet_name: &str, cells: &str) -> String {
    format!("'{}'!{cells}", sheet_name.replace('\'', "''"))
}

pub(crate) struct GoogleSheet {
    http_client: reqwest::Client,
    service_account_key: ServiceAccountKey,
    spreadsheet_id: String,
    sheet_name: String,
    sheet_id: Option<i64>,
    next_request: Instant,
}

impl GoogleSheet {
    pub(crate) async fn new(http_client: reqwest::Client, config: &Config) -> Result<Self, Error> {
        let service_account_key = read_service_account_key(&config.service_account_key).await
            .map_err(|source| Error::ServiceAccountKey { source, path: config.service_account_key.clone() })?;
        Ok(Self {
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            sheet_id: None,
            next_request: Instant::now(),
            http_client, service_account_key,
        })
    }

    async fn auth_token(&self) -> Result<String, Error> {
        let auth = ServiceAccountAuthenticator::builder(self.service_account_key.clone())
            .build().await.map_err(Error::Authenticator)?;
        let token = auth.token(&[SCOPE]).await?;
        if token.is_expired() { return Err(Error::TokenExpired) }
        let Some(token) = token.token() else { return Err(Error::EmptyToken) };
        if token.is_empty() { return Err(Error::EmptyToken) }
        Ok(token.to_owned())
    }

    /// Sends an authenticated request, keeping requests at least [`RATE_LIMIT`] apart.
    async fn send(&mut self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        sleep_until(self.next_request).await;
        let token = self.auth_token().await?;
        let response = request.bearer_auth(token).send().await?.error_for_status();
        self.next_request = Instant::now() + RATE_LIMIT;
        Ok(response?)
    }

    /// The numeric ID of the configured sheet, required by batch update requests.
    async fn sheet_id(&mut self) -> Result<i64, Error> {
        #[derive(Deserialize)]
        struct Spreadsheet {
            #[serde(default)]
            sheets: Vec<SheetEntry>,
        }

        #[derive(Deserialize)]
        struct SheetEntry {
            properties: SheetProperties,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SheetProperties {
            #[serde(default)]
            sheet_id: i64,
            title: String,
        }

        if let Some(sheet_id) = self.sheet_id {
            return Ok(sheet_id)
        }
        let request = self.http_client.get(&format!("{BASE_URL}/{}", self.spreadsheet_id))
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let Spreadsheet { sheets } = self.send(request).await?.json().await?;
        let sheet_id = sheets.into_iter()
            .find(|sheet| sheet.properties.title == self.sheet_name)
            .ok_or_else(|| Error::NoSuchSheet(self.sheet_name.clone()))?
            .properties.sheet_id;
        self.sheet_id = Some(sheet_id);
        Ok(sheet_id)
    }

    async fn batch_update(&mut self, requests: Vec<serde_json::Value>) -> Result<(), Error> {
        let request = self.http_client.post(&format!("{BASE_URL}/{}:batchUpdate", self.spreadsheet_id))
            .json(&json!({ "requests": requests }));
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl Sheet for GoogleSheet {
    async fn values(&mut self) -> Result<Vec<Vec<String>>, Error> {
        #[derive(Deserialize)]
        struct ValueRange {
            #[serde(default)]
            values: Vec<Vec<String>>,
        }

        let range = a1_range(&self.sheet_name, &format!("{FIRST_COLUMN}:{LAST_COLUMN}"));
        let request = self.http_client.get(&format!("{BASE_URL}/{}/values/{range}", self.spreadsheet_id))
            .query(&[
                ("valueRenderOption", "FORMATTED_VALUE"),
                ("dateTimeRenderOption", "FORMATTED_STRING"),
                ("majorDimension", "ROWS"),
            ]);
        let ValueRange { values } = self.send(request).await?.json().await?;
        Ok(values)
    }

    async fn overwrite_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ValueRange {
            range: String,
            major_dimension: &'static str,
            values: Vec<Vec<String>>,
        }

        let range = a1_range(&self.sheet_name, &format!("{FIRST_COLUMN}{row}:{LAST_COLUMN}{row}"));
        let request = self.http_client.put(&format!("{BASE_URL}/{}/values/{range}", self.spreadsheet_id))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&ValueRange {
                major_dimension: "ROWS",
                values: vec![cells],
                range,
            });
        self.send(request).await?;
        Ok(())
    }

    async fn insert_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error> {
        let sheet_id = self.sheet_id().await?;
        self.batch_update(vec![json!({
            "insertDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": row - 1,
                    "endIndex": row,
                },
                "inheritFromBefore": false,
            },
        })]).await?;
        self.overwrite_row(row, cells).await
    }

    async fn freeze_header(&mut self) -> Result<(), Error> {
        let sheet_id = self.sheet_id().await?;
        self.batch_update(vec![json!({
            "updateSheetProperties": {
                "properties": {
                    "sheetId": sheet_id,
                    "gridProperties": { "frozenRowCount": 1 },
                },
                "fields": "gridProperties.frozenRowCount",
            },
        })]).await
    }

    async fn sort_by_column(&mut self, column: usize) -> Result<(), Error> {
        let sheet_id = self.sheet_id().await?;
        self.batch_update(vec![json!({
            "sortRange": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": 1,
                },
                "sortSpecs": [{
                    "dimensionIndex": column - 1,
                    "sortOrder": "ASCENDING",
                }],
            },
        })]).await
    }
}

/// In-memory stand-in for a Google sheet.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySheet {
    pub(crate) rows: Vec<Vec<String>>,
    pub(crate) frozen_rows: usize,
    pub(crate) sorted_by: Option<usize>,
    pub(crate) writes: usize,
}

#[cfg(test)]
impl MemorySheet {
    pub(crate) fn with_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows.iter().map(|row| row.iter().map(|&cell| cell.to_owned()).collect()).collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Sheet for MemorySheet {
    async fn values(&mut self) -> Result<Vec<Vec<String>>, Error> {
        Ok(self.rows.clone())
    }

    async fn overwrite_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error> {
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::default);
        }
        self.rows[row - 1] = cells;
        self.writes += 1;
        Ok(())
    }

    async fn insert_row(&mut self, row: usize, cells: Vec<String>) -> Result<(), Error> {
        if self.rows.len() < row - 1 {
            self.rows.resize_with(row - 1, Vec::default);
        }
        self.rows.insert(row - 1, cells);
        self.writes += 1;
        Ok(())
    }

    async fn freeze_header(&mut self) -> Result<(), Error> {
        self.frozen_rows = 1;
        Ok(())
    }

    async fn sort_by_column(&mut self, column: usize) -> Result<(), Error> {
        if let Some(data) = self.rows.get_mut(1..) {
            data.sort_by(|a, b| a.get(column - 1).cmp(&b.get(column - 1)));
        }
        self.sorted_by = Some(column);
        Ok(())
    }
}
