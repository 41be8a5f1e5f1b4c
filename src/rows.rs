//! Flattening start.gg tournaments into spreadsheet rows.

use crate::{
    prelude::*,
    startgg::Tournament,
};

const TOURNAMENT_BASE_URL: &str = "https://www.start.gg/";

/// One tournament as it appears in the sheet, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    pub(crate) start: DateTime<Utc>,
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) country_code: String,
    pub(crate) region_code: String,
    pub(crate) venue_address: String,
    /// Distinct game names of the tournament's events, joined with ` / `.
    pub(crate) games: String,
}

impl Row {
    /// Returns `None` for tournaments without an events list.
    pub(crate) fn from_tournament(tournament: Tournament) -> Option<Self> {
        let Tournament { id, slug, name, start_at, country_code, addr_state, venue_address, events } = tournament;
        let url = format!("{TOURNAMENT_BASE_URL}{slug}/details");
        let Some(events) = events else {
            log::info!("skipping tournament {id} ({url}): no events listed");
            return None
        };
        let Some(start) = DateTime::from_timestamp(start_at, 0) else {
            log::warn!("skipping tournament {id} ({url}): start time {start_at} out of range");
            return None
        };
        let games = events.into_iter()
            .filter_map(identity)
            .filter_map(|event| event.videogame)
            .filter_map(|videogame| videogame.name)
            .unique()
            .join(" / ");
        Some(Self {
            country_code: country_code.unwrap_or_default(),
            region_code: addr_state.unwrap_or_default(),
            venue_address: venue_address.unwrap_or_default(),
            start, name, url, games,
        })
    }

    /// Cell values for the sheet. The start time is rendered in `timezone` so the spreadsheet parses it as a local date.
    pub(crate) fn cells(&self, timezone: Tz) -> Vec<String> {
        vec![
            self.start.with_timezone(&timezone).format("%Y-%m-%d %H:%M:%S").to_string(),
            self.name.clone(),
            self.url.clone(),
            self.country_code.clone(),
            self.region_code.clone(),
            self.venue_address.clone(),
            self.games.clone(),
        ]
    }
}

pub(crate) fn from_tournaments(tournaments: Vec<Tournament>) -> Vec<Row> {
    tournaments.into_iter().filter_map(Row::from_tournament).collect()
}
