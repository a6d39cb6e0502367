//! Chunked, concurrent loading of many bundles.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chart_core::{ChartError, Patient};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::discovery::is_json_location;
use crate::fetch::{Fetch, SourceFetcher};

/// Where the bundles come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sources {
    /// Explicit bundle locations. Only `.json` entries are loaded.
    Locations(Vec<String>),
    /// A directory or listing URL whose `.json` files are discovered.
    Directory(String),
}

/// Snapshot passed to the progress callback after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

pub type ProgressFn = Box<dyn FnMut(&Progress) + Send>;

/// Batch loading options.
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Sources fetched concurrently per chunk; values below 1 count as 1.
    pub chunk_size: usize,
    /// Record failures and keep going instead of aborting the batch.
    pub continue_on_error: bool,
    /// Upper bound for fetching one source.
    pub timeout: Duration,
    #[serde(skip)]
    pub on_progress: Option<ProgressFn>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            continue_on_error: true,
            timeout: Duration::from_secs(30),
            on_progress: None,
        }
    }
}

impl LoadConfig {
    pub fn with_progress(mut self, callback: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadConfig")
            .field("chunk_size", &self.chunk_size)
            .field("continue_on_error", &self.continue_on_error)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Patients in input order, plus the sources that failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub patients: Vec<Patient>,
    pub errors: Vec<SourceError>,
    pub summary: LoadSummary,
}

/// Loads bundles through a [`Fetch`] implementation and indexes them.
#[derive(Debug)]
pub struct BundleLoader<F = SourceFetcher> {
    fetcher: Arc<F>,
}

impl<F> Clone for BundleLoader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl Default for BundleLoader<SourceFetcher> {
    fn default() -> Self {
        Self::new(SourceFetcher::new())
    }
}

impl<F: Fetch> BundleLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    /// Fetches one bundle and builds its patient.
    pub async fn load_one(&self, location: &str) -> Result<Patient, ChartError> {
        let body = self.fetcher.fetch(location).await?;
        let patient = chart_fhir::build_patient_str(&body)?;
        tracing::debug!(location, patient_id = patient.id.as_deref().unwrap_or("-"), "loaded bundle");
        Ok(patient)
    }

    /// Loads many bundles, `chunk_size` at a time.
    ///
    /// Chunks run one after another; the sources inside a chunk are fetched
    /// concurrently. Patients and errors keep the order of the input.
    pub async fn load_many(
        &self,
        sources: Sources,
        mut config: LoadConfig,
    ) -> Result<LoadReport, ChartError> {
        let (limit, continue_on_error) = (config.timeout, config.continue_on_error);
        let locations = self.resolve(sources, limit).await?;
        let total = locations.len();
        let chunk_size = config.chunk_size.max(1);

        tracing::info!(total, chunk_size, "loading bundles");

        let mut report = LoadReport {
            summary: LoadSummary {
                total,
                ..LoadSummary::default()
            },
            ..LoadReport::default()
        };

        for chunk in locations.chunks(chunk_size) {
            let outcomes = self.run_chunk(chunk, limit, continue_on_error).await?;

            for (location, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(patient) => {
                        report.patients.push(patient);
                        report.summary.successful += 1;
                    }
                    Err(err) => {
                        tracing::warn!(location = %location, error = %err, "bundle failed");
                        report.errors.push(SourceError {
                            location: location.clone(),
                            message: err.to_string(),
                        });
                        report.summary.failed += 1;
                    }
                }
            }

            let progress = Progress {
                processed: report.summary.successful + report.summary.failed,
                total,
                successful: report.summary.successful,
                failed: report.summary.failed,
            };
            tracing::debug!(
                processed = progress.processed,
                total,
                failed = progress.failed,
                "chunk finished"
            );
            if let Some(callback) = config.on_progress.as_mut() {
                callback(&progress);
            }
        }

        tracing::info!(
            total,
            successful = report.summary.successful,
            failed = report.summary.failed,
            "batch load finished"
        );

        if report.summary.successful == 0 {
            if let Some(first) = report.errors.first() {
                return Err(ChartError::AllSourcesFailed {
                    total,
                    first: first.message.clone(),
                });
            }
        }

        Ok(report)
    }

    /// Discovery of a `Directory` source is bounded by `limit`, like a fetch.
    async fn resolve(&self, sources: Sources, limit: Duration) -> Result<Vec<String>, ChartError> {
        match sources {
            Sources::Locations(candidates) => {
                let offered = candidates.len();
                let locations: Vec<String> = candidates
                    .into_iter()
                    .filter(|location| is_json_location(location))
                    .collect();

                if locations.is_empty() {
                    return Err(ChartError::NoValidSources(format!(
                        "{offered} provided locations"
                    )));
                }
                if locations.len() < offered {
                    tracing::debug!(
                        dropped = offered - locations.len(),
                        "ignoring locations without a .json suffix"
                    );
                }
                Ok(locations)
            }
            Sources::Directory(location) => {
                let discovered = match tokio::time::timeout(limit, self.fetcher.list(&location)).await {
                    Ok(found) => found,
                    Err(_) => {
                        tracing::warn!(
                            location = %location,
                            timeout_ms = limit.as_millis() as u64,
                            "directory listing timed out"
                        );
                        Vec::new()
                    }
                };
                if discovered.is_empty() {
                    tracing::info!(location = %location, "nothing discovered, loading location as a single source");
                    Ok(vec![location])
                } else {
                    tracing::debug!(location = %location, found = discovered.len(), "discovered bundles");
                    Ok(discovered)
                }
            }
        }
    }

    /// One outcome per location of `chunk`, in chunk order.
    ///
    /// With `continue_on_error` off the first failure aborts the remaining
    /// tasks and is returned as the error.
    async fn run_chunk(
        &self,
        chunk: &[String],
        limit: Duration,
        continue_on_error: bool,
    ) -> Result<Vec<Result<Patient, ChartError>>, ChartError> {
        let mut tasks = JoinSet::new();
        for (position, location) in chunk.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let location = location.clone();
            tasks.spawn(async move {
                let outcome = load_within(fetcher.as_ref(), &location, limit).await;
                (position, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Patient, ChartError>>> =
            chunk.iter().map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, Err(err))) if !continue_on_error => {
                    tracing::warn!(location = %chunk[position], error = %err, "aborting batch");
                    tasks.abort_all();
                    return Err(err);
                }
                Ok((position, outcome)) => slots[position] = Some(outcome),
                Err(err) => tracing::error!(error = %err, "bundle task did not complete"),
            }
        }

        let mut outcomes = Vec::with_capacity(chunk.len());
        for (location, slot) in chunk.iter().zip(slots) {
            let outcome = slot.unwrap_or_else(|| {
                Err(ChartError::retrieval(location.as_str(), "task did not complete"))
            });
            if continue_on_error {
                outcomes.push(outcome);
            } else {
                outcomes.push(Ok(outcome?));
            }
        }
        Ok(outcomes)
    }
}

async fn load_within<F: Fetch>(
    fetcher: &F,
    location: &str,
    limit: Duration,
) -> Result<Patient, ChartError> {
    let body = tokio::time::timeout(limit, fetcher.fetch(location))
        .await
        .map_err(|_| {
            ChartError::retrieval(location, format!("timed out after {}ms", limit.as_millis()))
        })??;
    chart_fhir::build_patient_str(&body)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone)]
    struct Canned {
        body: Result<String, String>,
        delay: Duration,
    }

    /// Serves canned bodies, optionally after a delay.
    #[derive(Default)]
    struct MemoryFetcher {
        sources: HashMap<String, Canned>,
        listings: HashMap<String, Vec<String>>,
        listing_delay: Duration,
    }

    impl MemoryFetcher {
        fn serve(mut self, location: &str, body: Result<String, String>, delay_ms: u64) -> Self {
            self.sources.insert(
                location.to_string(),
                Canned {
                    body,
                    delay: Duration::from_millis(delay_ms),
                },
            );
            self
        }

        fn patient(self, location: &str, id: &str) -> Self {
            self.serve(location, Ok(bundle(id)), 0)
        }
    }

    impl Fetch for MemoryFetcher {
        fn fetch(&self, location: &str) -> impl Future<Output = Result<String, ChartError>> + Send {
            let canned = self.sources.get(location).cloned();
            let location = location.to_string();
            async move {
                let Some(canned) = canned else {
                    return Err(ChartError::retrieval(location, "not found"));
                };
                tokio::time::sleep(canned.delay).await;
                canned
                    .body
                    .map_err(|message| ChartError::retrieval(location, message))
            }
        }

        fn list(&self, location: &str) -> impl Future<Output = Vec<String>> + Send {
            let found = self.listings.get(location).cloned().unwrap_or_default();
            let delay = self.listing_delay;
            async move {
                tokio::time::sleep(delay).await;
                found
            }
        }
    }

    fn bundle(id: &str) -> String {
        serde_json::json!({
            "resourceType": "Bundle",
            "entry": [{"resource": {"resourceType": "Patient", "id": id}}]
        })
        .to_string()
    }

    fn locations(names: &[&str]) -> Sources {
        Sources::Locations(names.iter().map(|name| name.to_string()).collect())
    }

    fn patient_ids(report: &LoadReport) -> Vec<&str> {
        report
            .patients
            .iter()
            .map(|patient| patient.id.as_deref().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn partial_failures_are_reported() {
        let mut fetcher = MemoryFetcher::default();
        for n in 1..=7 {
            if n == 4 {
                fetcher = fetcher.serve("p4.json", Err("connection reset".into()), 0);
            } else {
                fetcher = fetcher.patient(&format!("p{n}.json"), &format!("p{n}"));
            }
        }

        let config = LoadConfig {
            chunk_size: 3,
            ..LoadConfig::default()
        };
        let report = BundleLoader::new(fetcher)
            .load_many(
                locations(&["p1.json", "p2.json", "p3.json", "p4.json", "p5.json", "p6.json", "p7.json"]),
                config,
            )
            .await
            .unwrap();

        assert_eq!(
            report.summary,
            LoadSummary {
                total: 7,
                successful: 6,
                failed: 1
            }
        );
        assert_eq!(patient_ids(&report), vec!["p1", "p2", "p3", "p5", "p6", "p7"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location, "p4.json");
        assert!(report.errors[0].message.contains("connection reset"));
    }

    #[tokio::test]
    async fn results_keep_input_order_within_a_chunk() {
        let fetcher = MemoryFetcher::default()
            .serve("slow.json", Ok(bundle("slow")), 40)
            .serve("medium.json", Ok(bundle("medium")), 20)
            .serve("fast.json", Ok(bundle("fast")), 0);

        let report = BundleLoader::new(fetcher)
            .load_many(
                locations(&["slow.json", "medium.json", "fast.json"]),
                LoadConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(patient_ids(&report), vec!["slow", "medium", "fast"]);
    }

    #[tokio::test]
    async fn all_failures_surface_the_first_error() {
        let fetcher = MemoryFetcher::default()
            .serve("a.json", Ok("{not json".into()), 0)
            .serve("b.json", Err("HTTP status 404 Not Found".into()), 0);

        let err = BundleLoader::new(fetcher)
            .load_many(locations(&["a.json", "b.json"]), LoadConfig::default())
            .await
            .unwrap_err();

        match err {
            ChartError::AllSourcesFailed { total, first } => {
                assert_eq!(total, 2);
                assert!(first.starts_with("invalid JSON"), "first was {first}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn fail_fast_returns_the_first_failure() {
        let fetcher = MemoryFetcher::default()
            .patient("a.json", "a")
            .serve("b.json", Ok(r#"{"entry": []}"#.into()), 0)
            .patient("c.json", "c");

        let calls = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&calls);
        let config = LoadConfig {
            chunk_size: 2,
            continue_on_error: false,
            ..LoadConfig::default()
        }
        .with_progress(move |_| *seen.lock().unwrap() += 1);

        let err = BundleLoader::new(fetcher)
            .load_many(locations(&["a.json", "b.json", "c.json"]), config)
            .await
            .unwrap_err();

        assert_eq!(err, ChartError::MissingPatientResource);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn progress_is_reported_per_chunk() {
        let mut fetcher = MemoryFetcher::default();
        let mut names = Vec::new();
        for n in 0..7 {
            let name = format!("p{n}.json");
            fetcher = fetcher.patient(&name, &format!("p{n}"));
            names.push(name);
        }

        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let config = LoadConfig {
            chunk_size: 3,
            ..LoadConfig::default()
        }
        .with_progress(move |progress| sink.lock().unwrap().push(*progress));

        BundleLoader::new(fetcher)
            .load_many(Sources::Locations(names), config)
            .await
            .unwrap();

        let processed: Vec<usize> = updates.lock().unwrap().iter().map(|p| p.processed).collect();
        assert_eq!(processed, vec![3, 6, 7]);
        assert!(updates.lock().unwrap().iter().all(|p| p.total == 7));
    }

    #[tokio::test]
    async fn zero_chunk_size_is_treated_as_one() {
        let fetcher = MemoryFetcher::default().patient("a.json", "a").patient("b.json", "b");
        let updates = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&updates);
        let config = LoadConfig {
            chunk_size: 0,
            ..LoadConfig::default()
        }
        .with_progress(move |_| *sink.lock().unwrap() += 1);

        let report = BundleLoader::new(fetcher)
            .load_many(locations(&["a.json", "b.json"]), config)
            .await
            .unwrap();

        assert_eq!(report.summary.successful, 2);
        assert_eq!(*updates.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn slow_sources_time_out() {
        let fetcher = MemoryFetcher::default()
            .patient("fast.json", "fast")
            .serve("slow.json", Ok(bundle("slow")), 500);

        let config = LoadConfig {
            timeout: Duration::from_millis(50),
            ..LoadConfig::default()
        };
        let report = BundleLoader::new(fetcher)
            .load_many(locations(&["fast.json", "slow.json"]), config)
            .await
            .unwrap();

        assert_eq!(patient_ids(&report), vec!["fast"]);
        assert!(report.errors[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn non_json_locations_are_rejected() {
        let err = BundleLoader::new(MemoryFetcher::default())
            .load_many(locations(&["notes.txt", "image.png"]), LoadConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::NoValidSources(_)));

        let err = BundleLoader::new(MemoryFetcher::default())
            .load_many(Sources::Locations(Vec::new()), LoadConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::NoValidSources(_)));
    }

    #[tokio::test]
    async fn directory_discovery_falls_back_to_the_location() {
        let mut fetcher = MemoryFetcher::default()
            .patient("https://host/bundles/a.json", "a")
            .patient("https://host/single", "single");
        fetcher.listings.insert(
            "https://host/bundles".to_string(),
            vec!["https://host/bundles/a.json".to_string()],
        );
        let loader = BundleLoader::new(fetcher);

        let listed = loader
            .load_many(
                Sources::Directory("https://host/bundles".to_string()),
                LoadConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(patient_ids(&listed), vec!["a"]);

        let single = loader
            .load_many(
                Sources::Directory("https://host/single".to_string()),
                LoadConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(patient_ids(&single), vec!["single"]);
    }

    #[tokio::test]
    async fn hung_listing_is_bounded_by_the_timeout() {
        let mut fetcher = MemoryFetcher::default()
            .patient("https://host/bundles/a.json", "a")
            .patient("https://host/bundles", "whole");
        fetcher.listings.insert(
            "https://host/bundles".to_string(),
            vec!["https://host/bundles/a.json".to_string()],
        );
        fetcher.listing_delay = Duration::from_secs(60);

        let config = LoadConfig {
            timeout: Duration::from_millis(50),
            ..LoadConfig::default()
        };
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            BundleLoader::new(fetcher)
                .load_many(Sources::Directory("https://host/bundles".to_string()), config),
        )
        .await
        .expect("listing was not bounded")
        .unwrap();

        assert_eq!(patient_ids(&report), vec!["whole"]);
    }

    #[test]
    fn config_defaults() {
        let config = LoadConfig::default();
        assert_eq!(config.chunk_size, 5);
        assert!(config.continue_on_error);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.on_progress.is_none());
    }
}
