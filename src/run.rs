//! One sync run: page through upcoming tournaments until the window is exhausted or the budget is spent.

use crate::{
    prelude::*,
    rows,
    sheets::{
        self,
        Sheet,
    },
    startgg::{
        self,
        TournamentSource,
    },
    sync,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sheets(#[from] sheets::Error),
    #[error(transparent)] StartGG(#[from] startgg::Error),
}

/// Limits how much work a single run does, so that it finishes within the scheduler's interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Budget {
    pub(crate) max_duration: Duration,
    pub(crate) max_pages: Option<u32>,
}

impl Budget {
    fn allows_another_page(&self, started: Instant, pages: u32) -> bool {
        started.elapsed() < self.max_duration && self.max_pages.is_none_or(|max_pages| pages < max_pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// start.gg returned an empty page, so every tournament in the window has been synced.
    Exhausted,
    Budget,
    /// start.gg reported errors. The failed page is retried next run.
    ApiError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "no more tournaments"),
            Self::Budget => write!(f, "budget spent"),
            Self::ApiError => write!(f, "start.gg API error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) pages: u32,
    pub(crate) inserted: usize,
    pub(crate) updated: usize,
    pub(crate) stop: StopReason,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetched {} pages, inserted {} rows, updated {} rows ({})", self.pages, self.inserted, self.updated, self.stop)
    }
}

/// Syncs pages starting after `state.page_number` and returns the state to persist for the next run.
///
/// The sheet's header is frozen and its rows sorted by start date after the last page, regardless of why the run stopped.
/// Transport and sheet errors abort the run; the caller should not persist anything in that case.
pub(crate) async fn run(source: &mut impl TournamentSource, sheet: &mut impl Sheet, timezone: Tz, budget: Budget, state: State) -> Result<(State, Report), Error> {
    let started = Instant::now();
    let mut index = sync::prepare(sheet).await?;
    log::debug!("sheet has {} tournaments", index.len());
    let mut page = state.page_number;
    let mut pages = 0;
    let mut inserted = 0;
    let mut updated = 0;
    let stop = loop {
        page += 1;
        let tournaments = match source.tournaments(page).await {
            Ok(tournaments) => tournaments,
            Err(startgg::Error::GraphQL(_)) => {
                page -= 1;
                break StopReason::ApiError
            }
            Err(e) => return Err(e.into()),
        };
        pages += 1;
        if tournaments.is_empty() {
            break StopReason::Exhausted
        }
        let rows = rows::from_tournaments(tournaments);
        let applied = sync::apply_rows(sheet, &mut index, &rows, timezone).await?;
        log::info!("page {page}: inserted {} rows, updated {} rows", applied.inserted, applied.updated);
        inserted += applied.inserted;
        updated += applied.updated;
        if !budget.allows_another_page(started, pages) {
            break StopReason::Budget
        }
    };
    sheet.freeze_header().await?;
    sheet.sort_by_column(sync::START_COLUMN).await?;
    let state = State {
        page_number: match stop {
            StopReason::Exhausted => 0,
            StopReason::Budget | StopReason::ApiError => page,
        },
    };
    Ok((state, Report { pages, inserted, updated, stop }))
}

#[cfg(test)]
mod tests {
    use {
        std::collections::VecDeque,
        crate::{
            rows::tests::tournament,
            sheets::MemorySheet,
            startgg::Tournament,
            sync::HEADER,
        },
        super::*,
    };

    /// Serves pre-recorded pages and remembers which pages were requested. Runs out into empty pages.
    struct ScriptedSource {
        pages: VecDeque<Result<Vec<Tournament>, startgg::Error>>,
        requested: Vec<u32>,
    }

    impl ScriptedSource {
        fn new(pages: impl IntoIterator<Item = Result<Vec<Tournament>, startgg::Error>>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                requested: Vec::default(),
            }
        }
    }

    #[async_trait]
    impl TournamentSource for ScriptedSource {
        async fn tournaments(&mut self, page: u32) -> Result<Vec<Tournament>, startgg::Error> {
            self.requested.push(page);
            self.pages.pop_front().unwrap_or_else(|| Ok(Vec::default()))
        }
    }

    fn api_error() -> startgg::Error {
        startgg::Error::GraphQL(vec![graphql_client::Error {
            message: format!("An unknown error has occurred"),
            locations: None,
            path: None,
            extensions: None,
        }])
    }

    const UNLIMITED: Budget = Budget {
        max_duration: Duration::from_secs(60 * 60),
        max_pages: None,
    };

    #[tokio::test]
    async fn empty_page_resets_cursor() {
        let mut source = ScriptedSource::new([
            Ok(vec![tournament("a", 1_700_000_000, Some(&["A"])), tournament("b", 1_600_000_000, Some(&["B"]))]),
            Ok(vec![tournament("c", 1_650_000_000, Some(&["C"]))]),
        ]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let (state, report) = run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State { page_number: 0 }).await.unwrap();
        assert_eq!(source.requested, [1, 2, 3]);
        assert_eq!(state, State { page_number: 0 });
        assert_eq!(report, Report { pages: 3, inserted: 3, updated: 0, stop: StopReason::Exhausted });
        assert_eq!(sheet.rows.len(), 4);
    }

    #[tokio::test]
    async fn budget_keeps_cursor_at_last_page() {
        let mut source = ScriptedSource::new([
            Ok(vec![tournament("a", 1_700_000_000, Some(&["A"]))]),
            Ok(vec![tournament("b", 1_700_000_000, Some(&["B"]))]),
            Ok(vec![tournament("c", 1_700_000_000, Some(&["C"]))]),
        ]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let budget = Budget { max_pages: Some(2), ..UNLIMITED };
        let (state, report) = run(&mut source, &mut sheet, Tz::UTC, budget, State { page_number: 4 }).await.unwrap();
        assert_eq!(source.requested, [5, 6]);
        assert_eq!(state, State { page_number: 6 });
        assert_eq!(report.stop, StopReason::Budget);
    }

    #[tokio::test]
    async fn zero_duration_budget_still_syncs_one_page() {
        let mut source = ScriptedSource::new([
            Ok(vec![tournament("a", 1_700_000_000, Some(&["A"]))]),
        ]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let budget = Budget { max_duration: Duration::ZERO, max_pages: None };
        let (state, report) = run(&mut source, &mut sheet, Tz::UTC, budget, State { page_number: 0 }).await.unwrap();
        assert_eq!(state, State { page_number: 1 });
        assert_eq!(report, Report { pages: 1, inserted: 1, updated: 0, stop: StopReason::Budget });
    }

    #[tokio::test]
    async fn api_error_retries_failed_page_next_run() {
        let mut source = ScriptedSource::new([
            Ok(vec![tournament("a", 1_700_000_000, Some(&["A"]))]),
            Err(api_error()),
        ]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let (state, report) = run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State { page_number: 2 }).await.unwrap();
        assert_eq!(source.requested, [3, 4]);
        assert_eq!(state, State { page_number: 3 });
        assert_eq!(report.stop, StopReason::ApiError);
        assert_eq!(report.pages, 1);
        assert_eq!(sheet.frozen_rows, 1);
    }

    #[tokio::test]
    async fn transport_errors_abort() {
        let mut source = ScriptedSource::new([Err(startgg::Error::NoDataNoErrors)]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let result = run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State { page_number: 0 }).await;
        assert!(matches!(result, Err(Error::StartGG(startgg::Error::NoDataNoErrors))));
        assert_eq!(sheet.sorted_by, None);
    }

    #[tokio::test]
    async fn page_of_unlisted_tournaments_continues() {
        let mut source = ScriptedSource::new([
            Ok(vec![tournament("a", 1_700_000_000, None)]),
            Ok(vec![tournament("b", 1_700_000_000, Some(&["B"]))]),
        ]);
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        let (state, report) = run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State { page_number: 0 }).await.unwrap();
        assert_eq!(state, State { page_number: 0 });
        assert_eq!(report, Report { pages: 3, inserted: 1, updated: 0, stop: StopReason::Exhausted });
        assert_eq!(sheet.rows[1][2], "https://www.start.gg/b/details");
    }

    #[tokio::test]
    async fn sheet_is_frozen_and_sorted_by_start() {
        let mut source = ScriptedSource::new([
            Ok(vec![
                tournament("late", 1_700_000_000, Some(&["A"])),
                tournament("early", 1_600_000_000, Some(&["A"])),
            ]),
        ]);
        let mut sheet = MemorySheet::with_rows(&[
            &HEADER,
            &["2023-12-01 00:00:00", "existing", "https://www.start.gg/existing/details", "", "", "", ""],
        ]);
        run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State::default()).await.unwrap();
        assert_eq!(sheet.frozen_rows, 1);
        assert_eq!(sheet.sorted_by, Some(1));
        assert_eq!(sheet.rows[0], HEADER);
        assert_eq!(sheet.rows.iter().skip(1).map(|row| &*row[2]).collect_vec(), [
            "https://www.start.gg/early/details",
            "https://www.start.gg/late/details",
            "https://www.start.gg/existing/details",
        ]);
    }

    #[tokio::test]
    async fn rerun_updates_instead_of_duplicating() {
        let mut sheet = MemorySheet::with_rows(&[&HEADER]);
        for _ in 0..2 {
            let mut source = ScriptedSource::new([Ok(vec![tournament("a", 1_700_000_000, Some(&["A"]))])]);
            run(&mut source, &mut sheet, Tz::UTC, UNLIMITED, State::default()).await.unwrap();
        }
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.writes, 2);
    }
}
