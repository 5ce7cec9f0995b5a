use std::{fmt::Write as _, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    api::{ApiError, ClassificationBackend, HttpBackend},
    cache::ResultCache,
    config::AppConfig,
    domain::{BatchRequest, ResultPage, ResultQuery, TaskState},
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    ingest,
    tasks::{
        batch::{BatchOutcome, BatchSubmitter},
        bulk::{BulkClassifier, BulkEvent},
        fetcher::{ResultFetcher, SharedCache},
        poller::{TaskEvent, TaskRegistry},
    },
    view::{command::HELP, Command, DashboardState, DataSource, Renderer},
};

struct FetchOutcome {
    query: ResultQuery,
    result: Result<ResultPage, ApiError>,
}

struct BatchSubmission {
    request: BatchRequest,
    result: Result<BatchOutcome, ApiError>,
}

/// What the loop does after handling one input.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Redraw,
    Print(String),
    Quit,
}

pub struct DashboardApp {
    config: Arc<AppConfig>,
    backend: Arc<dyn ClassificationBackend>,
    fetcher: Arc<ResultFetcher>,
    batches: Arc<BatchSubmitter>,
    registry: TaskRegistry,
    task_events: mpsc::UnboundedReceiver<TaskEvent>,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    batch_tx: mpsc::UnboundedSender<BatchSubmission>,
    batch_rx: mpsc::UnboundedReceiver<BatchSubmission>,
    bulk_tx: mpsc::UnboundedSender<BulkEvent>,
    bulk_rx: mpsc::UnboundedReceiver<BulkEvent>,
    bulk_handle: Option<JoinHandle<()>>,
    batch_in_flight: bool,
    renderer: Renderer,
    state: DashboardState,
    shutdown: Shutdown,
}

impl DashboardApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(format!(
                "classification-dashboard/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        let backend: Arc<dyn ClassificationBackend> =
            Arc::new(HttpBackend::new(http_client, config.api.clone()));
        tracing::info!(
            target: "app",
            logs = %paths.logs_dir.join("dashboard.log").display(),
            "writing logs"
        );

        Ok(Self::with_backend(config, backend, shutdown))
    }

    fn with_backend(
        config: AppConfig,
        backend: Arc<dyn ClassificationBackend>,
        shutdown: Shutdown,
    ) -> Self {
        let config = Arc::new(config);
        let cache: SharedCache = Arc::new(Mutex::new(ResultCache::new(config.fetch.stale_time)));
        let fetcher = Arc::new(ResultFetcher::new(
            backend.clone(),
            cache.clone(),
            config.fetch.clone(),
        ));
        let batches = Arc::new(BatchSubmitter::new(backend.clone(), cache.clone()));
        let (registry, task_events) = TaskRegistry::new(backend.clone(), cache, config.tasks.clone());

        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (bulk_tx, bulk_rx) = mpsc::unbounded_channel();

        Self {
            renderer: Renderer::new(&config.display.timezone),
            state: DashboardState::new(config.fetch.page_size, config.fetch.server_side_filter),
            config,
            backend,
            fetcher,
            batches,
            registry,
            task_events,
            fetch_tx,
            fetch_rx,
            batch_tx,
            batch_rx,
            bulk_tx,
            bulk_rx,
            bulk_handle: None,
            batch_in_flight: false,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<()> {
        self.run_with_input(BufReader::new(io::stdin())).await
    }

    async fn run_with_input<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        tracing::info!(target: "app", api = %self.config.api.base_url, "dashboard started");

        let mut shutdown_listener = self.shutdown.subscribe();
        let mut lines = input.lines();
        let mut ticker = interval(self.config.fetch.refetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.draw().await?;

        loop {
            let flow = tokio::select! {
                _ = shutdown_listener.notified() => {
                    tracing::info!(target: "app", "shutdown signal received");
                    Flow::Quit
                }
                _ = ticker.tick() => self.refetch_if_stale(),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line).await,
                    Ok(None) => {
                        tracing::info!(target: "app", "stdin closed");
                        Flow::Quit
                    }
                    Err(err) => {
                        tracing::error!(target: "app", error = %err, "failed to read command input");
                        Flow::Quit
                    }
                },
                Some(outcome) = self.fetch_rx.recv() => self.apply_fetch(outcome),
                Some(submission) = self.batch_rx.recv() => self.apply_batch(submission),
                Some(event) = self.task_events.recv() => self.apply_task_event(event),
                Some(event) = self.bulk_rx.recv() => self.apply_bulk_event(event),
            };

            match flow {
                Flow::Continue => {}
                Flow::Redraw => self.draw().await?,
                Flow::Print(text) => print(&text).await?,
                Flow::Quit => break,
            }
        }

        self.shutdown.trigger();
        let cancelled = self.registry.cancel_all();
        if let Some(handle) = self.bulk_handle.take() {
            handle.abort();
        }
        tracing::info!(target: "app", cancelled_tasks = cancelled, "dashboard stopped");
        Ok(())
    }

    async fn draw(&self) -> Result<()> {
        let frame = self
            .renderer
            .render_dashboard(&self.state, &self.registry.active());
        print(&frame).await
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match line.parse::<Command>() {
            Ok(command) => self.handle_command(command).await,
            Err(err) => Flow::Print(err.to_string()),
        }
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        tracing::debug!(target: "app", ?command, "command");
        match command {
            Command::Help => Flow::Print(HELP.to_string()),
            Command::Refresh => match self.state.active_source() {
                DataSource::Remote => {
                    self.request_page(true);
                    Flow::Redraw
                }
                DataSource::Local => match self.state.local_path().cloned() {
                    Some(path) => self.load_local(path).await,
                    None => Flow::Print("No local file loaded. Use 'load <path>'.".to_string()),
                },
                DataSource::Bulk => Flow::Redraw,
            },
            Command::Next => {
                if !self.state.next_page() {
                    return Flow::Print("Already on the last page.".to_string());
                }
                self.request_page(false);
                Flow::Redraw
            }
            Command::Prev => {
                if !self.state.prev_page() {
                    return Flow::Print("Already on the first page.".to_string());
                }
                self.request_page(false);
                Flow::Redraw
            }
            Command::Filter(category) => {
                self.state.select_category(category);
                if self.config.fetch.server_side_filter {
                    self.request_page(false);
                }
                Flow::Redraw
            }
            Command::ClearFilter => {
                self.state.clear_filter();
                if self.config.fetch.server_side_filter {
                    self.request_page(false);
                }
                Flow::Redraw
            }
            Command::Source(source) => {
                match source {
                    Some(source) => self.state.set_source(source),
                    None => {
                        self.state.toggle_source();
                    }
                }
                self.request_page(false);
                Flow::Redraw
            }
            Command::Load(path) => self.load_local(path).await,
            Command::Process {
                total_emails,
                batch_size,
            } => self.submit_batch(total_emails, batch_size),
            Command::Bulk { batch_size } => self.start_bulk(batch_size),
            Command::Tasks => Flow::Print(self.describe_tasks()),
            Command::Cancel(Some(task_id)) => {
                if self.registry.cancel(&task_id) {
                    Flow::Print(format!("Stopped polling task {task_id}."))
                } else {
                    Flow::Print(format!("No active task {task_id}."))
                }
            }
            Command::Cancel(None) => {
                let cancelled = self.registry.cancel_all();
                Flow::Print(format!("Stopped polling {cancelled} task(s)."))
            }
            Command::Quit => Flow::Quit,
        }
    }

    /// Spawns a read for the remote page in view. Does nothing for other sources.
    fn request_page(&mut self, force: bool) {
        if self.state.active_source() != DataSource::Remote {
            return;
        }
        let query = self.state.remote_query();
        if let Some(page) = self.fetcher.cached(&query) {
            self.state.apply_remote_page(&query, page);
        }
        let fetcher = self.fetcher.clone();
        let outcomes = self.fetch_tx.clone();
        self.state.set_loading(true);

        tokio::spawn(async move {
            let result = if force {
                fetcher.refresh(&query).await
            } else {
                fetcher.fetch(&query).await
            };
            let _ = outcomes.send(FetchOutcome { query, result });
        });
    }

    fn refetch_if_stale(&mut self) -> Flow {
        if self.state.active_source() != DataSource::Remote || self.state.is_loading() {
            return Flow::Continue;
        }
        if self.fetcher.is_stale(&self.state.remote_query()) {
            tracing::trace!(target: "fetch", "current page is stale; refetching");
            self.request_page(false);
        }
        Flow::Continue
    }

    fn apply_fetch(&mut self, outcome: FetchOutcome) -> Flow {
        let current = outcome.query == self.state.remote_query();
        match outcome.result {
            Ok(page) => {
                if !self.state.apply_remote_page(&outcome.query, page) {
                    tracing::debug!(
                        target: "fetch",
                        skip = outcome.query.skip,
                        "discarding page for a superseded view"
                    );
                    return Flow::Continue;
                }
                self.state.set_loading(false);
                self.state.clear_error();
                Flow::Redraw
            }
            Err(err) if current => {
                tracing::error!(target: "fetch", error = %err, "error fetching results");
                self.state.set_loading(false);
                self.state.set_error(format!("Failed to fetch results: {err}"));
                Flow::Redraw
            }
            Err(err) => {
                tracing::debug!(target: "fetch", error = %err, "superseded fetch failed");
                Flow::Continue
            }
        }
    }

    async fn load_local(&mut self, path: std::path::PathBuf) -> Flow {
        match ingest::load_file(&path).await {
            Ok(file) => {
                self.state.load_local(file.path, file.results);
                self.state.clear_error();
            }
            Err(err) => {
                tracing::warn!(target: "ingest", path = %path.display(), error = %err, "failed to load result file");
                self.state.set_error(err.to_string());
            }
        }
        Flow::Redraw
    }

    fn submit_batch(&mut self, total_emails: Option<u64>, batch_size: Option<u64>) -> Flow {
        if self.batch_in_flight {
            return Flow::Print("A batch is already being submitted.".to_string());
        }
        let request = BatchRequest {
            total_emails: total_emails.unwrap_or(self.config.batch.total_emails),
            batch_size: batch_size.unwrap_or(self.config.batch.batch_size),
            skip: self.state.batch_skip(),
        };
        let batches = self.batches.clone();
        let submissions = self.batch_tx.clone();
        self.batch_in_flight = true;

        tokio::spawn(async move {
            let result = batches.submit(request).await;
            let _ = submissions.send(BatchSubmission { request, result });
        });
        Flow::Print(format!(
            "Processing batch of {} emails starting at {}...",
            request.batch_size, request.skip
        ))
    }

    fn apply_batch(&mut self, submission: BatchSubmission) -> Flow {
        self.batch_in_flight = false;
        match submission.result {
            Ok(outcome) => {
                self.state.set_batch_skip(outcome.next_skip);
                for task_id in outcome.task_ids {
                    self.registry.track(task_id);
                }
                if !outcome.results.is_empty() {
                    tracing::info!(
                        target: "batch",
                        results = outcome.results.len(),
                        "batch returned results immediately"
                    );
                }
                self.state.clear_error();
                self.request_page(true);
            }
            Err(err) => {
                self.state.set_error(format!(
                    "Error processing batch at offset {}: {err}",
                    submission.request.skip
                ));
            }
        }
        Flow::Redraw
    }

    fn apply_task_event(&mut self, event: TaskEvent) -> Flow {
        match &event.state {
            TaskState::Completed => {
                self.request_page(true);
            }
            TaskState::Failed(reason) => {
                self.state.set_error(format!(
                    "Task {} failed: {}",
                    event.task_id,
                    reason.as_deref().unwrap_or("no reason given")
                ));
            }
            TaskState::TimedOut => {
                self.state.set_error(format!(
                    "Task {} did not finish within {}s",
                    event.task_id,
                    self.config.tasks.timeout.as_secs()
                ));
            }
            _ => {}
        }
        Flow::Redraw
    }

    fn start_bulk(&mut self, batch_size: Option<u64>) -> Flow {
        if self.state.bulk_running() {
            return Flow::Print("Bulk classification is already running.".to_string());
        }
        let batch_size = batch_size.unwrap_or(self.config.batch.batch_size);
        self.state.start_bulk();
        self.state.set_source(DataSource::Bulk);
        self.state.clear_error();

        let classifier = BulkClassifier::new(self.backend.clone(), batch_size);
        self.bulk_handle = Some(classifier.spawn(self.bulk_tx.clone(), self.shutdown.subscribe()));
        tracing::info!(target: "bulk", batch_size, "bulk classification started");
        Flow::Redraw
    }

    fn apply_bulk_event(&mut self, event: BulkEvent) -> Flow {
        match event {
            BulkEvent::Progress { results, processed } => {
                self.state.append_bulk(results, processed);
                if self.state.active_source() != DataSource::Bulk {
                    return Flow::Continue;
                }
            }
            BulkEvent::ServiceError(message) => {
                self.state
                    .set_error(format!("Classification service error: {message}"));
            }
            BulkEvent::Finished { .. } => {
                self.state.finish_bulk();
                self.bulk_handle = None;
            }
            BulkEvent::Failed(message) => {
                self.state.finish_bulk();
                self.bulk_handle = None;
                self.state
                    .set_error(format!("Bulk classification failed: {message}"));
            }
        }
        Flow::Redraw
    }

    fn describe_tasks(&self) -> String {
        if self.registry.is_empty() {
            return "No active tasks.".to_string();
        }
        let mut out = String::from("Active tasks:");
        for (task_id, state, age) in self.registry.active() {
            let _ = write!(
                out,
                "\n  {task_id:<36} {:<12} {}s",
                state.to_string(),
                age.as_secs()
            );
        }
        out
    }
}

async fn print(text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}
