use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{BenchmarkDefinition, GraphSettings, Settings};
use crate::framework::{self, FrameworkDescriptor};
use crate::http_probe::{self, ReadinessProbe};
use crate::prelude::*;
use crate::results::{FrameworkResult, ResultsStore};
use crate::supervisor::Supervisor;
use crate::wrk::{WrkExecutor, WrkSummary};
use crate::{graphs, script};

/// Either the wrk summary of one framework/benchmark pair or why there is none.
pub type PairOutcome = Result<WrkSummary>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for PairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PairState::Idle => "IDLE",
            PairState::Starting => "STARTING",
            PairState::Running => "RUNNING",
            PairState::Stopping => "STOPPING",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct SuiteReport {
    pub benchmark: String,
    pub results: Vec<FrameworkResult>,
    /// Framework name and the reason it produced no result.
    pub failures: Vec<(String, Error)>,
    /// `None` when the suite was not meant to be saved or had nothing to save.
    pub persisted: Option<Result<()>>,
}

impl SuiteReport {
    pub fn sorted_by_rps(&self) -> Vec<&FrameworkResult> {
        let mut sorted: Vec<&FrameworkResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.rps.total_cmp(&a.rps));
        sorted
    }

    fn log_summary(&self) {
        if self.results.is_empty() {
            warn!("No results for {}", self.benchmark);
            return;
        }
        info!("{} benchmark results (sorted by RPS):", self.benchmark.to_uppercase());
        for result in self.sorted_by_rps() {
            info!("  {}: {:.2} RPS", result.framework, result.rps);
        }
    }
}

pub struct Orchestrator {
    frameworks: Vec<FrameworkDescriptor>,
    benchmarks: Vec<BenchmarkDefinition>,
    scripts: HashMap<String, PathBuf>,
    supervisor: Supervisor,
    executor: WrkExecutor,
    store: ResultsStore,
    cooldown: Duration,
    graphs: Option<GraphSettings>,
}

impl Orchestrator {
    pub fn new(settings: Settings, benchmarks: Vec<BenchmarkDefinition>) -> Result<Self> {
        let probe = http_probe::from_settings(&settings.server.readiness);
        Self::with_probe(settings, benchmarks, probe)
    }

    /// Generates the wrk scripts for every benchmark up front. A benchmark
    /// that cannot finish inside the wrk timeout is rejected here.
    pub fn with_probe(
        settings: Settings,
        benchmarks: Vec<BenchmarkDefinition>,
        probe: Box<dyn ReadinessProbe>,
    ) -> Result<Self> {
        let wrk_timeout = settings.wrk.timeout();
        for definition in &benchmarks {
            match definition.run_duration() {
                Some(run) if run < wrk_timeout => {}
                _ => {
                    return Err(Error::config(
                        &settings.tests,
                        format!(
                            "{}: duration '{}' must be shorter than the wrk timeout ({:?})",
                            definition.name, definition.duration, wrk_timeout
                        ),
                    ));
                }
            }
        }
        let scripts = script::generate_all(&benchmarks, &settings.scripts_dir)?;
        Ok(Orchestrator {
            frameworks: settings.frameworks,
            benchmarks,
            scripts,
            cooldown: settings.server.cooldown(),
            supervisor: Supervisor::new(settings.server, probe),
            executor: WrkExecutor::new(settings.wrk),
            store: ResultsStore::new(settings.results),
            graphs: settings.graphs,
        })
    }

    pub fn frameworks(&self) -> &[FrameworkDescriptor] {
        &self.frameworks
    }

    pub fn framework(&self, key: &str) -> Result<&FrameworkDescriptor> {
        framework::find(&self.frameworks, key).ok_or_else(|| {
            let available: Vec<&str> = self.frameworks.iter().map(|f| f.key.as_str()).collect();
            Error::UnknownFramework(format!("{} (available: {})", key, available.join(", ")))
        })
    }

    pub fn benchmark(&self, name: &str) -> Result<&BenchmarkDefinition> {
        self.benchmarks
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| {
                let available: Vec<&str> =
                    self.benchmarks.iter().map(|b| b.name.as_str()).collect();
                Error::InvalidTest(format!("{} (available: {})", name, available.join(", ")))
            })
    }

    fn enter(&self, framework: &FrameworkDescriptor, from: PairState, to: PairState) {
        debug!("{}: {} -> {}", framework.key, from, to);
    }

    /// Start, measure, stop. The server is stopped whatever wrk does, and the
    /// cooldown follows every stop.
    pub async fn benchmark_framework(
        &self,
        framework: &FrameworkDescriptor,
        definition: &BenchmarkDefinition,
    ) -> PairOutcome {
        info!("{}", "=".repeat(50));
        info!("Benchmarking {} - {}", framework.name, definition.name);
        info!("{}", "=".repeat(50));

        let script = self
            .scripts
            .get(&definition.name)
            .ok_or_else(|| Error::InvalidTest(definition.name.clone()))?;
        let url = definition.target_url(framework.port)?;

        self.enter(framework, PairState::Idle, PairState::Starting);
        let server = match self.supervisor.start(framework).await {
            Ok(server) => server,
            Err(e) => {
                self.enter(framework, PairState::Starting, PairState::Idle);
                return Err(e);
            }
        };

        debug!("{} running as pid {:?}", framework.name, server.pid());
        self.enter(framework, PairState::Starting, PairState::Running);
        let outcome = self.executor.run(definition, script, &url).await;

        self.enter(framework, PairState::Running, PairState::Stopping);
        if let Err(e) = self.supervisor.stop(server).await {
            error!("Failed to stop {}: {}", framework.name, e);
        }
        self.enter(framework, PairState::Stopping, PairState::Idle);

        if !self.cooldown.is_zero() {
            debug!("Cooling down for {:?}", self.cooldown);
            tokio::time::sleep(self.cooldown).await;
        }
        outcome
    }

    pub async fn run_suite(
        &self,
        definition: &BenchmarkDefinition,
        frameworks: &[&FrameworkDescriptor],
        persist: bool,
    ) -> SuiteReport {
        info!("{}", "=".repeat(60));
        info!("Running {} benchmark suite", definition.name.to_uppercase());
        info!("{}", "=".repeat(60));

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for framework in frameworks {
            match self.benchmark_framework(framework, definition).await {
                Ok(summary) => {
                    info!("✓ {}: {:.2} RPS", framework.name, summary.requests_per_sec);
                    results.push(FrameworkResult {
                        framework: framework.name.clone(),
                        rps: summary.requests_per_sec,
                    });
                }
                Err(e) => {
                    warn!("✗ {}: Failed ({})", framework.name, e);
                    failures.push((framework.name.clone(), e));
                }
            }
        }

        let persisted = if persist && !results.is_empty() {
            let outcome = self.store.merge_and_persist(&definition.name, &results);
            if let Err(e) = &outcome {
                error!("Error updating results file: {}", e);
            }
            Some(outcome)
        } else {
            None
        };

        let report = SuiteReport {
            benchmark: definition.name.clone(),
            results,
            failures,
            persisted,
        };
        report.log_summary();
        report
    }

    /// Every benchmark on every framework on its own, nothing saved.
    pub async fn run_framework(&self, framework: &FrameworkDescriptor) -> Vec<SuiteReport> {
        let mut reports = Vec::with_capacity(self.benchmarks.len());
        for definition in &self.benchmarks {
            reports.push(self.run_suite(definition, &[framework], false).await);
        }
        reports
    }

    /// Every benchmark on every framework, saved, then the charts.
    pub async fn run_all(&self, regenerate_graphs: bool) -> Vec<SuiteReport> {
        let frameworks: Vec<&FrameworkDescriptor> = self.frameworks.iter().collect();
        let mut reports = Vec::with_capacity(self.benchmarks.len());
        for definition in &self.benchmarks {
            reports.push(self.run_suite(definition, &frameworks, true).await);
        }

        if reports.iter().any(|r| !r.results.is_empty()) {
            match &self.graphs {
                Some(settings) if regenerate_graphs => {
                    graphs::regenerate(settings).await;
                }
                Some(_) => info!("Skipping graph generation"),
                None => debug!("No graph command configured"),
            }
        }
        info!("Benchmarking complete!");
        reports
    }
}
