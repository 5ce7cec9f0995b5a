use std::{fmt, path::PathBuf, str::FromStr};

use crate::domain::{ClassificationResult, ResultPage, ResultQuery};

use super::summary::{category_summary, CategoryCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
    Local,
    Bulk,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataSource::Remote => "remote",
            DataSource::Local => "local file",
            DataSource::Bulk => "bulk stream",
        };
        f.write_str(label)
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" | "api" => Ok(DataSource::Remote),
            "local" | "file" => Ok(DataSource::Local),
            "bulk" | "stream" => Ok(DataSource::Bulk),
            other => Err(format!("unknown source '{other}' (expected remote, local or bulk)")),
        }
    }
}

/// `(skip, limit)` window over one data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub skip: u64,
    pub limit: u64,
}

impl Cursor {
    pub fn new(limit: u64) -> Self {
        Self {
            skip: 0,
            limit: limit.max(1),
        }
    }

    fn advance(&mut self) {
        self.skip += self.limit;
    }

    fn retreat(&mut self) {
        self.skip = self.skip.saturating_sub(self.limit);
    }

    fn window<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = usize::try_from(self.skip).unwrap_or(usize::MAX).min(items.len());
        let end = usize::try_from(self.skip.saturating_add(self.limit))
            .unwrap_or(usize::MAX)
            .min(items.len());
        &items[start..end]
    }
}

#[derive(Debug)]
struct RemoteSource {
    page: Option<ResultPage>,
    cursor: Cursor,
}

#[derive(Debug)]
struct LocalSource {
    path: Option<PathBuf>,
    results: Vec<ClassificationResult>,
    cursor: Cursor,
}

#[derive(Debug)]
struct BulkSource {
    results: Vec<ClassificationResult>,
    cursor: Cursor,
    processed: u64,
    running: bool,
}

/// Everything the dashboard shows, independent of how it is drawn.
#[derive(Debug)]
pub struct DashboardState {
    remote: RemoteSource,
    local: LocalSource,
    bulk: BulkSource,
    active: DataSource,
    filter: Option<String>,
    server_side_filter: bool,
    error: Option<String>,
    loading: bool,
    batch_skip: u64,
}

impl DashboardState {
    pub fn new(page_size: u64, server_side_filter: bool) -> Self {
        Self {
            remote: RemoteSource {
                page: None,
                cursor: Cursor::new(page_size),
            },
            local: LocalSource {
                path: None,
                results: Vec::new(),
                cursor: Cursor::new(page_size),
            },
            bulk: BulkSource {
                results: Vec::new(),
                cursor: Cursor::new(page_size),
                processed: 0,
                running: false,
            },
            active: DataSource::Remote,
            filter: None,
            server_side_filter,
            error: None,
            loading: false,
            batch_skip: 0,
        }
    }

    pub fn active_source(&self) -> DataSource {
        self.active
    }

    pub fn set_source(&mut self, source: DataSource) {
        self.active = source;
    }

    /// Flips between the remote and the local source.
    pub fn toggle_source(&mut self) -> DataSource {
        self.active = match self.active {
            DataSource::Remote => DataSource::Local,
            DataSource::Local | DataSource::Bulk => DataSource::Remote,
        };
        self.active
    }

    /// Query for the remote page currently in view.
    pub fn remote_query(&self) -> ResultQuery {
        let category = if self.server_side_filter {
            self.filter.clone()
        } else {
            None
        };
        ResultQuery::new(self.remote.cursor.skip, self.remote.cursor.limit, category)
    }

    /// Stores a fetched page if it still matches the current cursor.
    ///
    /// Returns false for responses that belong to a superseded view.
    pub fn apply_remote_page(&mut self, query: &ResultQuery, page: ResultPage) -> bool {
        if *query != self.remote_query() {
            return false;
        }
        self.remote.page = Some(page);
        true
    }

    pub fn cursor(&self) -> Cursor {
        match self.active {
            DataSource::Remote => self.remote.cursor,
            DataSource::Local => self.local.cursor,
            DataSource::Bulk => self.bulk.cursor,
        }
    }

    pub fn load_local(&mut self, path: PathBuf, results: Vec<ClassificationResult>) {
        self.local = LocalSource {
            path: Some(path),
            results,
            cursor: Cursor::new(self.local.cursor.limit),
        };
        self.active = DataSource::Local;
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        self.local.path.as_ref()
    }

    pub fn start_bulk(&mut self) {
        self.bulk.results.clear();
        self.bulk.cursor = Cursor::new(self.bulk.cursor.limit);
        self.bulk.processed = 0;
        self.bulk.running = true;
    }

    pub fn append_bulk(&mut self, results: Vec<ClassificationResult>, processed: u64) {
        self.bulk.results.extend(results);
        self.bulk.processed += processed;
    }

    pub fn finish_bulk(&mut self) {
        self.bulk.running = false;
    }

    pub fn bulk_running(&self) -> bool {
        self.bulk.running
    }

    pub fn bulk_processed(&self) -> u64 {
        self.bulk.processed
    }

    /// Results of the active source inside its current window, before filtering.
    pub fn source_results(&self) -> &[ClassificationResult] {
        match self.active {
            DataSource::Remote => self
                .remote
                .page
                .as_ref()
                .map(|page| page.results.as_slice())
                .unwrap_or(&[]),
            DataSource::Local => self.local.cursor.window(&self.local.results),
            DataSource::Bulk => self.bulk.cursor.window(&self.bulk.results),
        }
    }

    /// Total size of the active source when known.
    pub fn source_total(&self) -> Option<u64> {
        match self.active {
            DataSource::Remote => self.remote.page.as_ref().and_then(|page| page.total),
            DataSource::Local => Some(self.local.results.len() as u64),
            DataSource::Bulk => Some(self.bulk.results.len() as u64),
        }
    }

    pub fn visible_results(&self) -> Vec<&ClassificationResult> {
        let results = self.source_results().iter();
        match &self.filter {
            Some(category) => results
                .filter(|result| result.final_category() == category.as_str())
                .collect(),
            None => results.collect(),
        }
    }

    pub fn category_summary(&self) -> Vec<CategoryCount> {
        category_summary(self.source_results())
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn select_category(&mut self, category: impl Into<String>) {
        let category = category.into();
        if self.filter.as_deref() == Some(category.as_str()) {
            return;
        }
        self.filter = Some(category);
        self.reset_remote_for_filter();
    }

    pub fn clear_filter(&mut self) {
        if self.filter.take().is_some() {
            self.reset_remote_for_filter();
        }
    }

    fn reset_remote_for_filter(&mut self) {
        if self.server_side_filter {
            self.remote.cursor.skip = 0;
            self.remote.page = None;
        }
    }

    pub fn can_next(&self) -> bool {
        let cursor = self.cursor();
        match self.active {
            DataSource::Remote => match &self.remote.page {
                Some(page) => {
                    (page.results.len() as u64) >= cursor.limit
                        && page
                            .total
                            .map_or(true, |total| cursor.skip + cursor.limit < total)
                }
                None => false,
            },
            DataSource::Local | DataSource::Bulk => self
                .source_total()
                .is_some_and(|total| cursor.skip + cursor.limit < total),
        }
    }

    pub fn can_prev(&self) -> bool {
        self.cursor().skip > 0
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_next() {
            return false;
        }
        self.active_cursor_mut().advance();
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.can_prev() {
            return false;
        }
        self.active_cursor_mut().retreat();
        true
    }

    fn active_cursor_mut(&mut self) -> &mut Cursor {
        match self.active {
            DataSource::Remote => &mut self.remote.cursor,
            DataSource::Local => &mut self.local.cursor,
            DataSource::Bulk => &mut self.bulk.cursor,
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn batch_skip(&self) -> u64 {
        self.batch_skip
    }

    pub fn set_batch_skip(&mut self, skip: u64) {
        self.batch_skip = skip;
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{page_of, result_in};

    use super::*;

    fn mixed_page() -> ResultPage {
        page_of(
            vec![
                result_in("Job", "a"),
                result_in("Spam", "b"),
                result_in("Job", "c"),
            ],
            Some(3),
        )
    }

    fn subjects(state: &DashboardState) -> Vec<String> {
        state
            .visible_results()
            .iter()
            .filter_map(|r| r.email_details.subject.clone())
            .collect()
    }

    #[test]
    fn category_filter_restricts_and_clear_restores() {
        let mut state = DashboardState::new(10, false);
        let query = state.remote_query();
        assert!(state.apply_remote_page(&query, mixed_page()));

        state.select_category("Job");
        assert_eq!(subjects(&state), vec!["a", "c"]);

        state.select_category("Nothing");
        assert!(state.visible_results().is_empty());

        state.clear_filter();
        assert_eq!(subjects(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn toggling_source_does_not_touch_the_other_one() {
        let mut state = DashboardState::new(10, false);
        let query = state.remote_query();
        state.apply_remote_page(&query, mixed_page());
        state.load_local(PathBuf::from("saved.json"), vec![result_in("Newsletter", "z")]);

        assert_eq!(state.active_source(), DataSource::Local);
        assert_eq!(subjects(&state), vec!["z"]);
        assert_eq!(state.category_summary().len(), 1);

        assert_eq!(state.toggle_source(), DataSource::Remote);
        assert_eq!(subjects(&state), vec!["a", "b", "c"]);
        assert_eq!(state.category_summary().len(), 2);

        state.toggle_source();
        assert_eq!(subjects(&state), vec!["z"]);
        assert_eq!(state.local_path(), Some(&PathBuf::from("saved.json")));
    }

    #[test]
    fn short_page_disables_next() {
        let mut state = DashboardState::new(3, false);
        let query = state.remote_query();
        state.apply_remote_page(&query, page_of(vec![result_in("Job", "a")], None));
        assert!(!state.can_next());
        assert!(!state.can_prev());
        assert!(!state.next_page());
    }

    #[test]
    fn known_total_disables_next_at_the_end() {
        let mut state = DashboardState::new(3, false);
        let query = state.remote_query();
        state.apply_remote_page(&query, page_of(mixed_page().results, Some(6)));
        assert!(state.next_page());
        assert_eq!(state.cursor().skip, 3);
        assert!(state.can_prev());

        let query = state.remote_query();
        state.apply_remote_page(&query, page_of(mixed_page().results, Some(6)));
        assert!(!state.can_next());

        assert!(state.prev_page());
        assert_eq!(state.cursor().skip, 0);
        assert!(!state.can_prev());
    }

    #[test]
    fn full_page_without_total_allows_next() {
        let mut state = DashboardState::new(3, false);
        let query = state.remote_query();
        state.apply_remote_page(&query, page_of(mixed_page().results, None));
        assert!(state.can_next());
    }

    #[test]
    fn superseded_responses_are_ignored() {
        let mut state = DashboardState::new(3, false);
        let first = state.remote_query();
        state.apply_remote_page(&first, page_of(mixed_page().results, None));
        state.next_page();

        assert!(!state.apply_remote_page(&first, page_of(vec![], None)));
        assert_eq!(state.source_results().len(), 3);
    }

    #[test]
    fn server_side_filter_moves_category_into_query() {
        let mut state = DashboardState::new(3, true);
        let query = state.remote_query();
        state.apply_remote_page(&query, page_of(mixed_page().results, None));
        state.next_page();

        state.select_category("Job");

        let query = state.remote_query();
        assert_eq!(query.category.as_deref(), Some("Job"));
        assert_eq!(query.skip, 0);
        assert!(state.source_results().is_empty());
    }

    #[test]
    fn local_source_is_windowed_in_memory() {
        let mut state = DashboardState::new(2, false);
        let results = (0..5).map(|i| result_in("Job", &format!("m{i}"))).collect();
        state.load_local(PathBuf::from("f.json"), results);

        assert_eq!(subjects(&state), vec!["m0", "m1"]);
        assert!(state.next_page());
        assert!(state.next_page());
        assert_eq!(subjects(&state), vec!["m4"]);
        assert!(!state.can_next());
    }

    #[test]
    fn bulk_results_accumulate() {
        let mut state = DashboardState::new(10, false);
        state.start_bulk();
        state.append_bulk(vec![result_in("Job", "a")], 1);
        state.append_bulk(vec![result_in("Spam", "b")], 1);
        state.finish_bulk();
        state.set_source(DataSource::Bulk);

        assert_eq!(state.bulk_processed(), 2);
        assert!(!state.bulk_running());
        assert_eq!(subjects(&state), vec!["a", "b"]);
    }
}
