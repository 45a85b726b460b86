//! One collection pass over a tier's scrapers.
//!
//! An exporter lives for exactly one request. It announces its descriptors
//! (Describe), then runs every scraper concurrently and merges what they
//! return (Collect). A failing or slow scraper never aborts the pass: its
//! failure is only visible through the observability samples below.
//!
//! ```text
//! obj_exporter_scrape_success{tier,scraper}          1 ok / 0 failed
//! obj_exporter_scrape_duration_seconds{tier,scraper}
//! obj_exporter_scrape_skipped_values{tier,scraper}   malformed values skipped
//! ```

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::desc::{fq_name, Sample, TypedDesc, ValueKind};
use crate::registry::Collection;
use crate::scraper::{ScrapeError, Scraper};

const EXPORTER_LABELS: &[&str] = &["tier", "scraper"];

fn exporter_desc(name: &str, help: &str) -> Arc<TypedDesc> {
    TypedDesc::new(fq_name("exporter", name), help, EXPORTER_LABELS, ValueKind::Gauge)
        .expect("static exporter descriptor")
}

static SCRAPE_SUCCESS: LazyLock<Arc<TypedDesc>> = LazyLock::new(|| {
    exporter_desc(
        "scrape_success",
        "Whether the scraper succeeded during this pass (1) or failed (0).",
    )
});

static SCRAPE_DURATION: LazyLock<Arc<TypedDesc>> = LazyLock::new(|| {
    exporter_desc(
        "scrape_duration_seconds",
        "Time the scraper took during this pass.",
    )
});

static SCRAPE_SKIPPED: LazyLock<Arc<TypedDesc>> = LazyLock::new(|| {
    exporter_desc(
        "scrape_skipped_values",
        "Stored values the scraper skipped during this pass because they were not numeric.",
    )
});

#[derive(Debug)]
pub struct Exporter {
    tier: String,
    scrapers: Vec<Arc<dyn Scraper>>,
    /// Upper bound for each individual scraper.
    timeout: Duration,
}

impl Exporter {
    pub fn new(tier: impl Into<String>, scrapers: Vec<Arc<dyn Scraper>>, timeout: Duration) -> Self {
        Self {
            tier: tier.into(),
            scrapers,
            timeout,
        }
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn scrapers(&self) -> &[Arc<dyn Scraper>] {
        &self.scrapers
    }

    /// Every descriptor this exporter can emit, each announced once.
    pub fn describe(&self) -> Vec<Arc<TypedDesc>> {
        let mut seen = HashSet::new();
        [&*SCRAPE_SUCCESS, &*SCRAPE_DURATION, &*SCRAPE_SKIPPED]
            .into_iter()
            .cloned()
            .chain(self.scrapers.iter().flat_map(|s| s.describe()))
            .filter(|d| seen.insert(d.desc().id))
            .collect()
    }

    /// Run every scraper once and merge their samples.
    ///
    /// Each scraper fills its own buffer; buffers are concatenated only after
    /// all of them finished, in scraper order.
    pub async fn collect(&self) -> Vec<Sample> {
        let started = Instant::now();
        let per_scraper = join_all(self.scrapers.iter().map(|s| self.run_scraper(s))).await;
        let samples: Vec<Sample> = per_scraper.into_iter().flatten().collect();
        debug!(
            tier = %self.tier,
            scrapers = self.scrapers.len(),
            samples = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection pass finished"
        );
        samples
    }

    /// Describe and collect in one go, ready to register into a registry.
    pub async fn gather(&self) -> Collection {
        let descs = self.describe();
        let samples = self.collect().await;
        Collection::new(descs, samples)
    }

    async fn run_scraper(&self, scraper: &Arc<dyn Scraper>) -> Vec<Sample> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, scraper.scrape()).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout(self.timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        let labels = [self.tier.as_str(), scraper.name()];
        let (mut samples, success, skipped) = match result {
            Ok(scrape) => {
                debug!(
                    tier = %self.tier,
                    scraper = scraper.name(),
                    samples = scrape.samples.len(),
                    skipped = scrape.skipped,
                    "scrape succeeded"
                );
                (scrape.samples, 1.0, scrape.skipped)
            }
            Err(e) => {
                warn!(tier = %self.tier, scraper = scraper.name(), error = %e, "scrape failed");
                (Vec::new(), 0.0, 0)
            }
        };

        samples.push(SCRAPE_SUCCESS.render(success, labels));
        samples.push(SCRAPE_DURATION.render(elapsed, labels));
        samples.push(SCRAPE_SKIPPED.render(skipped as f64, labels));
        samples
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::scraper::{Scrape, ScrapeFuture};
    use etcdvalue_sources::SourceError;

    /// Test scraper: emits `values` as `obj_fake{key}` samples, or fails.
    #[derive(Debug)]
    pub(crate) struct FakeScraper {
        pub name: String,
        pub desc: Arc<TypedDesc>,
        pub values: Vec<(&'static str, f64)>,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    impl FakeScraper {
        pub(crate) fn ok(name: &str, values: Vec<(&'static str, f64)>) -> Arc<dyn Scraper> {
            Arc::new(Self::build(name, values, false, None))
        }

        pub(crate) fn failing(name: &str) -> Arc<dyn Scraper> {
            Arc::new(Self::build(name, Vec::new(), true, None))
        }

        pub(crate) fn slow(name: &str, delay: Duration) -> Arc<dyn Scraper> {
            Arc::new(Self::build(name, vec![("slow", 1.0)], false, Some(delay)))
        }

        fn build(
            name: &str,
            values: Vec<(&'static str, f64)>,
            fail: bool,
            delay: Option<Duration>,
        ) -> Self {
            let desc = TypedDesc::new(
                fq_name("", &format!("fake_{name}")),
                "Fake values.",
                &["key"],
                ValueKind::Gauge,
            )
            .unwrap();
            Self {
                name: name.to_string(),
                desc,
                values,
                fail,
                delay,
            }
        }
    }

    impl Scraper for FakeScraper {
        fn name(&self) -> &str {
            &self.name
        }

        fn describe(&self) -> Vec<Arc<TypedDesc>> {
            vec![Arc::clone(&self.desc)]
        }

        fn scrape(&self) -> ScrapeFuture<'_> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail {
                    return Err(ScrapeError::Source(SourceError::Unavailable(
                        "connection refused".into(),
                    )));
                }
                Ok(Scrape::new(
                    self.values
                        .iter()
                        .map(|(k, v)| self.desc.render(*v, [*k]))
                        .collect(),
                ))
            })
        }
    }

    pub(crate) fn success_of<'a>(samples: &'a [Sample], scraper: &str) -> Vec<&'a Sample> {
        samples
            .iter()
            .filter(|s| s.desc().name() == "obj_exporter_scrape_success")
            .filter(|s| s.label("scraper") == Some(scraper))
            .collect()
    }

    fn without_durations(samples: Vec<Sample>) -> Vec<Sample> {
        samples
            .into_iter()
            .filter(|s| s.desc().name() != "obj_exporter_scrape_duration_seconds")
            .collect()
    }

    #[tokio::test]
    async fn collect_merges_scrapers_and_observability() {
        let exporter = Exporter::new(
            "mr",
            vec![
                FakeScraper::ok("a", vec![("k1", 42.0)]),
                FakeScraper::ok("b", vec![("k2", 1.0), ("k3", 2.0)]),
            ],
            Duration::from_secs(1),
        );

        let samples = exporter.collect().await;
        // 3 values + 3 observability samples per scraper.
        assert_eq!(samples.len(), 3 + 2 * 3);

        for name in ["a", "b"] {
            let success = success_of(&samples, name);
            assert_eq!(success.len(), 1);
            assert_eq!(success[0].value(), 1.0);
            assert_eq!(success[0].label("tier"), Some("mr"));
        }
    }

    #[tokio::test]
    async fn failing_scraper_does_not_blank_siblings() {
        let exporter = Exporter::new(
            "mr",
            vec![
                FakeScraper::ok("good", vec![("k1", 42.0)]),
                FakeScraper::failing("broken"),
            ],
            Duration::from_secs(1),
        );

        let samples = exporter.collect().await;
        let values: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.desc().name() == "obj_fake_good")
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value(), 42.0);

        assert!(samples.iter().all(|s| s.desc().name() != "obj_fake_broken"));
        let failed = success_of(&samples, "broken");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].value(), 0.0);
        assert_eq!(success_of(&samples, "good")[0].value(), 1.0);
    }

    #[tokio::test]
    async fn slow_scraper_is_cut_off_by_timeout() {
        let exporter = Exporter::new(
            "mr",
            vec![
                FakeScraper::slow("slow", Duration::from_secs(30)),
                FakeScraper::ok("fast", vec![("k1", 1.0)]),
            ],
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let samples = exporter.collect().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(success_of(&samples, "slow")[0].value(), 0.0);
        assert_eq!(success_of(&samples, "fast")[0].value(), 1.0);
    }

    #[tokio::test]
    async fn consecutive_passes_are_identical() {
        let exporter = Exporter::new(
            "mr",
            vec![
                FakeScraper::ok("a", vec![("k1", 42.0), ("k2", 7.5)]),
                FakeScraper::failing("b"),
            ],
            Duration::from_secs(1),
        );

        let first = without_durations(exporter.collect().await);
        let second = without_durations(exporter.collect().await);
        assert_eq!(first, second);
    }

    #[test]
    fn describe_covers_every_scraper_once() {
        let shared = FakeScraper::ok("a", Vec::new());
        let exporter = Exporter::new(
            "mr",
            vec![shared.clone(), shared, FakeScraper::failing("b")],
            Duration::from_secs(1),
        );

        let names: Vec<String> = exporter
            .describe()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "obj_exporter_scrape_success",
                "obj_exporter_scrape_duration_seconds",
                "obj_exporter_scrape_skipped_values",
                "obj_fake_a",
                "obj_fake_b",
            ]
        );
    }

    #[tokio::test]
    async fn collected_descriptors_are_always_described() {
        let exporter = Exporter::new(
            "mr",
            vec![FakeScraper::ok("a", vec![("k1", 1.0)]), FakeScraper::failing("b")],
            Duration::from_secs(1),
        );
        let described: HashSet<u64> = exporter.describe().iter().map(|d| d.desc().id).collect();
        for sample in exporter.collect().await {
            assert!(described.contains(&sample.desc().desc().id));
        }
    }

    #[tokio::test]
    async fn empty_exporter_collects_nothing() {
        let exporter = Exporter::new("mr", Vec::new(), Duration::from_secs(1));
        assert!(exporter.collect().await.is_empty());
        assert_eq!(exporter.describe().len(), 3);
    }
}
