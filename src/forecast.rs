use chrono::{Datelike, Days, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::aggregate;
use crate::classifier::{self, Classifier, ClassifierError, Features, LabeledExample, Predictor};
use crate::config::{ForecastConfig, MAX_HORIZON_DAYS};
use crate::models::{ForecastRecord, IssueRecord};
use crate::priority::PriorityEstimator;
use crate::regions::{self, RegionEncoding};
use crate::store::{ForecastSink, IssueRepository};

/// Dates forecast for a run on `today`: the `horizon_days` days after it,
/// never more than `MAX_HORIZON_DAYS` and never past the calendar's end.
pub fn horizon(today: NaiveDate, horizon_days: u32) -> impl Iterator<Item = NaiveDate> {
    (1..=u64::from(horizon_days.min(MAX_HORIZON_DAYS)))
        .map_while(move |offset| today.checked_add_days(Days::new(offset)))
}

/// One forecast per region per horizon day, regions in code order.
pub fn generate_forecasts(
    encoding: &RegionEncoding,
    model: &dyn Predictor,
    priorities: &PriorityEstimator,
    config: &ForecastConfig,
    today: NaiveDate,
) -> Vec<ForecastRecord> {
    let dates: Vec<NaiveDate> = horizon(today, config.horizon_days).collect();
    let mut forecasts = Vec::with_capacity(encoding.len() * dates.len());
    for code in encoding.codes() {
        let Some(region) = encoding.decode(code) else {
            continue;
        };
        for &date in &dates {
            let features = Features::new(code, date.weekday().num_days_from_monday(), date.month());
            let category = model.predict(features);
            forecasts.push(ForecastRecord {
                region: region.to_string(),
                category: category.to_string(),
                expected_date: date,
                description: config.describe(category),
                priority: priorities.estimate(region, category),
                upvotes: 0,
            });
        }
    }
    forecasts
}

/// Trains a fresh model on the corpus and forecasts the coming days.
///
/// `run` is single-flight: from the corpus read through the forecast write it
/// holds both an in-process mutex and the sink's store-wide lock, so runs from
/// other pipelines or other processes queue behind it.
pub struct ForecastPipeline {
    config: ForecastConfig,
    classifier: Box<dyn Classifier + Send + Sync>,
    lock: Mutex<()>,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig) -> Self {
        let classifier = classifier::from_config(&config.model);
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(
        config: ForecastConfig,
        classifier: Box<dyn Classifier + Send + Sync>,
    ) -> Self {
        Self {
            config,
            classifier,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub async fn run<R, S>(&self, issues: &R, sink: &S) -> anyhow::Result<Vec<ForecastRecord>>
    where
        R: IssueRepository,
        S: ForecastSink,
    {
        self.run_at(issues, sink, Utc::now().date_naive()).await
    }

    /// Training faults abort before the sink is touched, leaving the previous
    /// forecasts in place. An empty result is still written.
    pub async fn run_at<R, S>(
        &self,
        issues: &R,
        sink: &S,
        today: NaiveDate,
    ) -> anyhow::Result<Vec<ForecastRecord>>
    where
        R: IssueRepository,
        S: ForecastSink,
    {
        let _guard = self.lock.lock().await;
        let _store_lock = sink.lock().await?;

        let corpus = issues.list_issues().await?;
        info!(records = corpus.len(), "loaded issue corpus");

        let forecasts = self.forecast(&corpus, today)?;
        sink.replace_forecasts(&forecasts).await?;
        info!(forecasts = forecasts.len(), "forecast collection replaced");

        Ok(forecasts)
    }

    /// The pure part of a run: corpus in, forecasts out.
    pub fn forecast(
        &self,
        corpus: &[IssueRecord],
        today: NaiveDate,
    ) -> Result<Vec<ForecastRecord>, ClassifierError> {
        let samples = aggregate::build_samples(corpus);
        let qualified = regions::qualify(samples, self.config.min_volume_threshold);
        if qualified.is_empty() {
            warn!(
                min_volume = self.config.min_volume_threshold,
                "no region has enough issues to forecast"
            );
            return Ok(Vec::new());
        }

        let encoding = RegionEncoding::new(qualified.regions.iter().cloned());
        let examples: Vec<LabeledExample<'_>> = qualified
            .samples
            .iter()
            .filter_map(|sample| {
                Some(LabeledExample {
                    features: Features::new(
                        encoding.encode(&sample.region)?,
                        sample.day_of_week,
                        sample.month,
                    ),
                    label: &sample.category,
                })
            })
            .collect();

        let model = self.classifier.fit(&examples)?;
        info!(
            model = self.classifier.name(),
            samples = examples.len(),
            regions = encoding.len(),
            "trained category model"
        );

        let priorities = PriorityEstimator::new(&qualified.samples, self.config.fallback_priority);
        Ok(generate_forecasts(
            &encoding,
            model.as_ref(),
            &priorities,
            &self.config,
            today,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex as StdMutex};

    use tokio::sync::OwnedMutexGuard;

    use super::*;
    use crate::config::ModelKind;
    use crate::models::Priority;

    const POTHOLES: &str = "Road / Potholes";
    const GARBAGE: &str = "Garbage / Waste";

    fn today() -> NaiveDate {
        // A Sunday, so the horizon is Monday through Wednesday.
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn issue(region: &str, category: &str, priority: &str, date: &str) -> IssueRecord {
        IssueRecord {
            region: Some(region.to_string()),
            category: Some(category.to_string()),
            priority: Some(priority.to_string()),
            date: Some(date.to_string()),
            title: Some(format!("{category} near {region}")),
            status: Some("Pending".to_string()),
            ..IssueRecord::default()
        }
    }

    /// Eight autumn pothole reports and four late-winter weekend garbage reports.
    fn busy_region(region: &str) -> Vec<IssueRecord> {
        let potholes = [
            "2025-10-13",
            "2025-10-14",
            "2025-10-15",
            "2025-10-18",
            "2025-10-19",
            "2025-09-20",
            "2025-11-16",
            "2025-08-11",
        ];
        let garbage = ["2026-03-07", "2026-03-08", "2026-04-04", "2026-02-15"];
        potholes
            .iter()
            .map(|date| issue(region, POTHOLES, "High", date))
            .chain(garbage.iter().map(|date| issue(region, GARBAGE, "Low", date)))
            .collect()
    }

    fn region_with(region: &str, count: usize) -> Vec<IssueRecord> {
        (0..count)
            .map(|i| {
                let date = format!("2026-0{}-1{}", i % 9 + 1, i % 10);
                issue(region, "Water / Leakage", "Medium", &date)
            })
            .collect()
    }

    #[derive(Default)]
    struct MemoryStore {
        issues: Vec<IssueRecord>,
        fail_reads: bool,
        writes: StdMutex<Vec<Vec<ForecastRecord>>>,
        events: StdMutex<Vec<&'static str>>,
        /// `None` leaves exclusion to the pipeline's own mutex.
        run_lock: Option<Arc<Mutex<()>>>,
    }

    impl MemoryStore {
        fn with_issues(issues: Vec<IssueRecord>) -> Self {
            Self {
                issues,
                ..Self::default()
            }
        }

        fn shared(issues: Vec<IssueRecord>) -> Self {
            Self {
                run_lock: Some(Arc::new(Mutex::new(()))),
                ..Self::with_issues(issues)
            }
        }

        fn writes(&self) -> Vec<Vec<ForecastRecord>> {
            self.writes.lock().unwrap().clone()
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    impl IssueRepository for MemoryStore {
        async fn list_issues(&self) -> anyhow::Result<Vec<IssueRecord>> {
            anyhow::ensure!(!self.fail_reads, "corpus unavailable");
            self.events.lock().unwrap().push("read");
            // Give a competing run the chance to interleave.
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            Ok(self.issues.clone())
        }

        async fn append_issues(&self, _: &str, issues: &[IssueRecord]) -> anyhow::Result<usize> {
            Ok(issues.len())
        }

        async fn replace_owner_issues(
            &self,
            _: &str,
            issues: &[IssueRecord],
        ) -> anyhow::Result<usize> {
            Ok(issues.len())
        }
    }

    impl ForecastSink for MemoryStore {
        type Lock = Option<OwnedMutexGuard<()>>;

        async fn lock(&self) -> anyhow::Result<Self::Lock> {
            match &self.run_lock {
                Some(lock) => Ok(Some(lock.clone().lock_owned().await)),
                None => Ok(None),
            }
        }

        async fn replace_forecasts(&self, forecasts: &[ForecastRecord]) -> anyhow::Result<()> {
            self.events.lock().unwrap().push("write");
            self.writes.lock().unwrap().push(forecasts.to_vec());
            Ok(())
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn fit(&self, _: &[LabeledExample<'_>]) -> Result<Box<dyn Predictor>, ClassifierError> {
            Err(ClassifierError::InvalidParameter("degenerate input".to_string()))
        }
    }

    fn forest_config() -> ForecastConfig {
        let mut config = ForecastConfig::default();
        config.model.kind = ModelKind::RandomForest;
        config
    }

    #[test]
    fn horizon_starts_tomorrow() {
        let dates: Vec<_> = horizon(today(), 3).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(),
            ]
        );
    }

    #[test]
    fn horizon_is_bounded() {
        assert_eq!(horizon(today(), u32::MAX).count(), MAX_HORIZON_DAYS as usize);
        assert_eq!(horizon(NaiveDate::MAX, 3).count(), 0);
    }

    #[test]
    fn majority_region_forecasts_potholes() {
        let mut corpus = busy_region("500001");
        corpus.extend(region_with("500002", 4));

        for config in [ForecastConfig::default(), forest_config()] {
            let pipeline = ForecastPipeline::new(config);
            let forecasts = pipeline.forecast(&corpus, today()).unwrap();

            assert_eq!(forecasts.len(), 3);
            for (offset, forecast) in forecasts.iter().enumerate() {
                assert_eq!(forecast.region, "500001");
                assert_eq!(forecast.category, POTHOLES);
                assert_eq!(forecast.priority, Priority::High);
                assert_eq!(
                    forecast.description,
                    "Potholes may increase due to rainy season."
                );
                assert_eq!(forecast.upvotes, 0);
                assert_eq!(
                    forecast.expected_date,
                    today() + Days::new(offset as u64 + 1)
                );
            }
        }
    }

    #[test]
    fn default_model_forecasts_majority_on_spread_history() {
        let potholes = [
            "2026-01-05",
            "2026-02-10",
            "2026-03-17",
            "2026-04-22",
            "2026-05-06",
            "2026-06-11",
            "2026-07-15",
            "2026-08-19",
        ];
        let garbage = ["2026-03-03", "2026-05-20", "2026-07-01", "2026-09-09"];
        let corpus: Vec<_> = potholes
            .iter()
            .map(|date| issue("500001", POTHOLES, "High", date))
            .chain(garbage.iter().map(|date| issue("500001", GARBAGE, "Low", date)))
            .collect();

        let forecasts = ForecastPipeline::new(ForecastConfig::default())
            .forecast(&corpus, today())
            .unwrap();

        assert_eq!(forecasts.len(), 3);
        for forecast in &forecasts {
            assert_eq!(forecast.region, "500001");
            assert_eq!(forecast.category, POTHOLES);
            assert_eq!(forecast.priority, Priority::High);
            assert_eq!(
                forecast.description,
                "Potholes may increase due to rainy season."
            );
        }
    }

    #[test]
    fn tenth_record_makes_region_eligible() {
        let pipeline = ForecastPipeline::new(ForecastConfig::default());

        let nine = region_with("500077", 9);
        assert!(pipeline.forecast(&nine, today()).unwrap().is_empty());

        let ten = region_with("500077", 10);
        let forecasts = pipeline.forecast(&ten, today()).unwrap();
        assert_eq!(forecasts.len(), 3);
        assert!(forecasts.iter().all(|f| f.region == "500077"));
        assert!(forecasts.iter().all(|f| f.category == "Water / Leakage"));
        assert!(forecasts.iter().all(|f| f.priority == Priority::Medium));
    }

    #[test]
    fn incomplete_records_do_not_count_toward_volume() {
        let mut corpus = region_with("500077", 9);
        corpus.push(issue("500077", "Water / Leakage", "Medium", "not a date"));
        corpus.push(IssueRecord {
            priority: None,
            ..issue("500077", "Water / Leakage", "Medium", "2026-05-05")
        });
        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        assert!(pipeline.forecast(&corpus, today()).unwrap().is_empty());
    }

    #[test]
    fn output_properties_hold_across_regions() {
        let mut corpus = busy_region("500001");
        corpus.extend(busy_region("500002"));
        corpus.extend(region_with("500003", 15));
        corpus.push(issue("500003", "Stray Animals", "High", "2026-10-19"));
        corpus.extend(region_with("600001", 5));

        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        let forecasts = pipeline.forecast(&corpus, today()).unwrap();
        assert_eq!(forecasts.len(), 3 * 3);

        let horizon: HashSet<_> = horizon(today(), 3).collect();
        let keys: HashSet<_> = forecasts.iter().map(ForecastRecord::key).collect();
        assert_eq!(keys.len(), forecasts.len());

        for forecast in &forecasts {
            assert_ne!(forecast.region, "600001");
            assert!(horizon.contains(&forecast.expected_date));
            assert!(!forecast.description.is_empty());
            let observed: HashSet<Priority> = aggregate::build_samples(&corpus)
                .into_iter()
                .filter(|s| s.region == forecast.region && s.category == forecast.category)
                .map(|s| s.priority)
                .collect();
            assert!(observed.contains(&forecast.priority) || forecast.priority == Priority::Low);
        }
    }

    #[test]
    fn uncurated_category_uses_template() {
        let corpus: Vec<_> = (1..=10)
            .map(|day| issue("500010", "Stray Animals", "Medium", &format!("2026-06-{day:02}")))
            .collect();
        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        let forecasts = pipeline.forecast(&corpus, today()).unwrap();
        assert_eq!(forecasts.len(), 3);
        assert!(forecasts
            .iter()
            .all(|f| f.description == "Stray Animals may occur due to past trends."));
    }

    #[test]
    fn horizon_length_follows_config() {
        let config = ForecastConfig {
            horizon_days: 5,
            ..ForecastConfig::default()
        };
        let forecasts = ForecastPipeline::new(config)
            .forecast(&busy_region("500001"), today())
            .unwrap();
        assert_eq!(forecasts.len(), 5);
        assert_eq!(
            forecasts.last().unwrap().expected_date,
            NaiveDate::from_ymd_opt(2026, 10, 23).unwrap()
        );
    }

    #[tokio::test]
    async fn identical_input_gives_identical_output() {
        let mut corpus = busy_region("500001");
        corpus.extend(region_with("500002", 12));
        let store = MemoryStore::with_issues(corpus);

        for config in [ForecastConfig::default(), forest_config()] {
            let first = ForecastPipeline::new(config.clone())
                .run_at(&store, &store, today())
                .await
                .unwrap();
            let second = ForecastPipeline::new(config)
                .run_at(&store, &store, today())
                .await
                .unwrap();

            assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn empty_corpus_still_clears_the_sink() {
        let store = MemoryStore::default();
        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        let forecasts = pipeline.run_at(&store, &store, today()).await.unwrap();
        assert!(forecasts.is_empty());
        assert_eq!(store.writes(), vec![Vec::new()]);
    }

    #[tokio::test]
    async fn training_failure_leaves_sink_untouched() {
        let store = MemoryStore::with_issues(busy_region("500001"));
        let pipeline =
            ForecastPipeline::with_classifier(ForecastConfig::default(), Box::new(FailingClassifier));
        assert!(pipeline.run_at(&store, &store, today()).await.is_err());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn read_failure_is_surfaced() {
        let store = MemoryStore {
            fail_reads: true,
            ..MemoryStore::default()
        };
        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        assert!(pipeline.run_at(&store, &store, today()).await.is_err());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_pipeline_are_serialized() {
        let store = MemoryStore::with_issues(busy_region("500001"));
        let pipeline = ForecastPipeline::new(ForecastConfig::default());
        let (a, b) = tokio::join!(
            pipeline.run_at(&store, &store, today()),
            pipeline.run_at(&store, &store, today())
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.events(), vec!["read", "write", "read", "write"]);
        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
    }

    #[tokio::test]
    async fn separate_pipelines_serialize_on_the_store_lock() {
        let store = MemoryStore::shared(busy_region("500001"));
        let first = ForecastPipeline::new(ForecastConfig::default());
        let second = ForecastPipeline::new(ForecastConfig::default());
        let (a, b) = tokio::join!(
            first.run_at(&store, &store, today()),
            second.run_at(&store, &store, today())
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.events(), vec!["read", "write", "read", "write"]);
    }
}
