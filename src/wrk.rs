use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::{BenchmarkDefinition, WrkSettings};
use crate::exec_utils::command_from_argv;
use crate::{
    parsers::{parse_latency, parse_metric},
    prelude::*,
};

static RE_RPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Requests/sec:\s+(\d+\.?\d*)").unwrap());
static RE_LATENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Latency\s+([\d.]+[a-zA-Zμ]+)\s+([\d.]+[a-zA-Zμ]+)\s+([\d.]+[a-zA-Zμ]+)")
        .unwrap()
});
static RE_THREAD_REQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Req/Sec\s+([\d.]+[kM]?)\s+").unwrap());
static RE_NON_2XX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Non-2xx or 3xx responses:\s+(\d+)").unwrap());
static RE_SOCKET_ERRORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*Socket errors:\s+connect\s+(\d+),\s+read\s+(\d+),\s+write\s+(\d+),\s+timeout\s+(\d+)",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct WrkSummary {
    pub requests_per_sec: f64,
    pub latency_avg: Option<Duration>,
    pub req_per_sec_avg: Option<f64>,
    pub errors: i64,
}

/// Pulls the throughput out of wrk's stdout.
pub fn extract_requests_per_sec(output: &str) -> Option<f64> {
    RE_RPS
        .captures(output)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn parse_wrk_output(output: &str) -> Result<WrkSummary> {
    let requests_per_sec = extract_requests_per_sec(output).ok_or_else(|| {
        Error::WrkParseError("wrk output: missing Requests/sec".to_string())
    })?;

    let mut latency_avg = None;
    let mut req_per_sec_avg = None;
    let mut errors: i64 = 0;
    for line in output.lines() {
        if let Some(cap) = RE_LATENCY.captures(line) {
            latency_avg = cap.get(1).and_then(|m| parse_latency(m.as_str()));
        } else if let Some(cap) = RE_THREAD_REQ.captures(line) {
            req_per_sec_avg = cap.get(1).and_then(|m| parse_metric(m.as_str()));
        } else if let Some(cap) = RE_NON_2XX.captures(line) {
            errors += cap
                .get(1)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(0);
        } else if let Some(cap) = RE_SOCKET_ERRORS.captures(line) {
            errors += (1..=4)
                .filter_map(|i| cap.get(i).and_then(|m| m.as_str().parse::<i64>().ok()))
                .sum::<i64>();
        }
    }

    Ok(WrkSummary {
        requests_per_sec,
        latency_avg,
        req_per_sec_avg,
        errors,
    })
}

pub struct WrkExecutor {
    settings: WrkSettings,
}

impl WrkExecutor {
    pub fn new(settings: WrkSettings) -> Self {
        WrkExecutor { settings }
    }

    pub fn command_line(
        &self,
        definition: &BenchmarkDefinition,
        script: &Path,
        url: &str,
    ) -> Vec<String> {
        let mut argv = self.settings.command.clone();
        argv.extend([
            format!("-t{}", definition.threads),
            format!("-c{}", definition.connections),
            format!("-d{}", definition.duration),
            url.to_string(),
            "-s".to_string(),
            script.display().to_string(),
        ]);
        argv
    }

    /// Runs wrk against `url`. Any failure comes back as an error for the
    /// caller to record as "no result".
    pub async fn run(
        &self,
        definition: &BenchmarkDefinition,
        script: &Path,
        url: &str,
    ) -> Result<WrkSummary> {
        let argv = self.command_line(definition, script, url);
        info!("Running benchmark: {}", argv.join(" "));

        let mut cmd = command_from_argv(&argv)?;
        let output = exec(&mut cmd, self.settings.timeout()).await?;
        let summary = parse_wrk_output(&output).inspect_err(|_| {
            error!("Could not extract RPS from wrk output");
            debug!("Output: {}", output);
        })?;
        info!("Extracted RPS: {}", summary.requests_per_sec);
        debug!(
            "Average latency: {:?}, per-thread Req/Sec: {:?}",
            summary.latency_avg, summary.req_per_sec_avg
        );
        if summary.errors > 0 {
            warn!("wrk reported {} errors", summary.errors);
        }
        Ok(summary)
    }
}
