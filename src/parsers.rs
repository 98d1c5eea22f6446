use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static RE_LATENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)([a-zA-Zμ]+)").unwrap());

pub fn parse_latency(s: &str) -> Option<Duration> {
    RE_LATENCY.captures(s).and_then(|cap| {
        let value: f64 = cap.get(1)?.as_str().parse().ok()?;
        let unit = cap.get(2)?.as_str();
        match unit {
            "us" | "μs" => Some(Duration::from_micros(value as u64)),
            "ms" => Some(Duration::from_micros((value * 1000.0) as u64)),
            "s" => Some(Duration::from_secs_f64(value)),
            "m" => Some(Duration::from_secs_f64(value * 60.0)),
            _ => None,
        }
    })
}

pub fn parse_metric(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix('k') {
        stripped.parse::<f64>().ok().map(|v| v * 1_000.0)
    } else if let Some(stripped) = s.strip_suffix('M') {
        stripped.parse::<f64>().ok().map(|v| v * 1_000_000.0)
    } else {
        s.parse::<f64>().ok()
    }
}
