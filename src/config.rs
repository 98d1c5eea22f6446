use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::framework::{self, FrameworkDescriptor};
use crate::prelude::*;

pub const DEFAULT_SETTINGS_PATH: &str = "config/bench.yaml";

static RE_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9]\d*)([smh]?)$").unwrap());

/// One named load test, as read from the definitions file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkDefinition {
    #[serde(alias = "bench_name")]
    pub name: String,
    pub method: String,
    pub url: String,
    #[serde(default, alias = "data")]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_connections")]
    pub connections: u32,
    #[serde(default = "default_duration")]
    pub duration: String,
}

fn default_threads() -> u32 {
    4
}

fn default_connections() -> u32 {
    64
}

fn default_duration() -> String {
    "10s".to_string()
}

impl BenchmarkDefinition {
    /// Body to send, if any. `null` and `{}` count as no body.
    pub fn request_body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref().filter(|body| match body {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        })
    }

    /// The definition URL pointed at `port`.
    pub fn target_url(&self, port: u16) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::InvalidTest(format!("{}: {}", self.name, e)))?;
        url.set_port(Some(port))
            .map_err(|_| Error::InvalidTest(format!("{}: url cannot carry a port", self.name)))?;
        Ok(url.to_string())
    }

    /// Run length passed to wrk; a bare number is seconds.
    pub fn run_duration(&self) -> Option<Duration> {
        let cap = RE_DURATION.captures(&self.duration)?;
        let value: u64 = cap[1].parse().ok()?;
        let secs = match &cap[2] {
            "m" => value.checked_mul(60)?,
            "h" => value.checked_mul(3600)?,
            _ => value,
        };
        Some(Duration::from_secs(secs))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("benchmark name must not be empty".to_string());
        }
        // Names become script file names.
        let mut components = Path::new(&self.name).components();
        let single_file_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(part)), None) if part.to_str() == Some(self.name.as_str())
        );
        if !single_file_name || self.name.contains(['/', '\\']) {
            return Err(format!(
                "{}: benchmark name must be a plain file name",
                self.name
            ));
        }
        if self.method.trim().is_empty() {
            return Err(format!("{}: method must not be empty", self.name));
        }
        let url = Url::parse(&self.url).map_err(|e| format!("{}: invalid url: {}", self.name, e))?;
        if url.host_str().is_none() {
            return Err(format!("{}: url has no host", self.name));
        }
        if self.threads == 0 || self.connections == 0 {
            return Err(format!(
                "{}: threads and connections must be positive",
                self.name
            ));
        }
        if self.connections < self.threads {
            return Err(format!(
                "{}: connections ({}) must be >= threads ({})",
                self.name, self.connections, self.threads
            ));
        }
        if self.run_duration().is_none() {
            return Err(format!(
                "{}: invalid duration '{}'",
                self.name, self.duration
            ));
        }
        Ok(())
    }
}

/// Loads the ordered benchmark definitions from a JSON or YAML file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<BenchmarkDefinition>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::config(path, e))?;
    let definitions: Vec<BenchmarkDefinition> =
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| Error::config(path, e))?
            }
            _ => serde_json::from_str(&content).map_err(|e| Error::config(path, e))?,
        };

    let mut names = HashSet::new();
    for definition in &definitions {
        definition
            .validate()
            .map_err(|reason| Error::config(path, reason))?;
        if !names.insert(definition.name.as_str()) {
            return Err(Error::config(
                path,
                format!("duplicate benchmark name '{}'", definition.name),
            ));
        }
    }
    debug!("Loaded {} benchmark definitions from {:?}", definitions.len(), path);
    Ok(definitions)
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WrkSettings {
    /// Program and leading arguments, e.g. `[wrk]` or a `docker run ... wrk` prefix.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for WrkSettings {
    fn default() -> Self {
        WrkSettings {
            command: vec!["wrk".to_string()],
            timeout_secs: 20,
        }
    }
}

impl WrkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Readiness {
    Tcp,
    Http {
        #[serde(default = "default_probe_path")]
        path: String,
    },
}

fn default_probe_path() -> String {
    "/".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub startup_timeout_secs: u64,
    pub probe_interval_ms: u64,
    pub stop_timeout_secs: u64,
    pub cooldown_secs: u64,
    pub readiness: Readiness,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            startup_timeout_secs: 30,
            probe_interval_ms: 250,
            stop_timeout_secs: 5,
            cooldown_secs: 2,
            readiness: Readiness::Tcp,
        }
    }
}

impl ServerSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GraphSettings {
    pub command: Vec<String>,
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

fn default_graph_timeout() -> u64 {
    120
}

/// Harness settings. Every field is optional in the file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub tests: PathBuf,
    pub results: PathBuf,
    pub scripts_dir: PathBuf,
    pub wrk: WrkSettings,
    pub server: ServerSettings,
    pub graphs: Option<GraphSettings>,
    pub frameworks: Vec<FrameworkDescriptor>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tests: PathBuf::from("config/tests.json"),
            results: PathBuf::from("benchmark_results.json"),
            scripts_dir: PathBuf::from("scripts"),
            wrk: WrkSettings::default(),
            server: ServerSettings::default(),
            graphs: None,
            frameworks: framework::default_frameworks(),
        }
    }
}

impl Settings {
    /// Loads `path`, or `config/bench.yaml` when present, or the built-in defaults.
    /// Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new(DEFAULT_SETTINGS_PATH);
        let (mut settings, source) = match path {
            Some(path) => (Self::from_file(path)?, path),
            None if default_path.exists() => (Self::from_file(default_path)?, default_path),
            None => {
                debug!("No settings file found, using built-in defaults");
                (Settings::default(), Path::new("<built-in defaults>"))
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate(source)?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::config(path, e))?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|e| Error::config(path, e))?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(wrk) = lookup("BENCH_WRK") {
            match self.wrk.command.first_mut() {
                Some(program) => *program = wrk,
                None => self.wrk.command.push(wrk),
            }
        }
        if let Some(results) = lookup("BENCH_RESULTS") {
            self.results = PathBuf::from(results);
        }
        if let Some(tests) = lookup("BENCH_TESTS") {
            self.tests = PathBuf::from(tests);
        }
    }

    fn validate(&self, source: &Path) -> Result<()> {
        if self.wrk.command.is_empty() {
            return Err(Error::config(source, "wrk.command must not be empty"));
        }
        if self.frameworks.is_empty() {
            return Err(Error::config(source, "no frameworks configured"));
        }
        let mut keys = HashSet::new();
        for fw in &self.frameworks {
            if fw.key.is_empty() || fw.key != fw.key.to_lowercase() {
                return Err(Error::config(
                    source,
                    format!("framework key '{}' must be non-empty lowercase", fw.key),
                ));
            }
            if !keys.insert(fw.key.as_str()) {
                return Err(Error::config(
                    source,
                    format!("duplicate framework key '{}'", fw.key),
                ));
            }
            if fw.command().is_empty() {
                return Err(Error::config(
                    source,
                    format!("framework '{}' has an empty command", fw.key),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_with_defaults_and_ignores_unknown_fields() {
        let file = temp_file(
            ".json",
            r#"[
                {"name": "ping", "method": "GET", "url": "http://localhost:8000/ping",
                 "threads": 2, "connections": 10, "duration": "5s"},
                {"name": "complex", "method": "POST", "url": "http://localhost:8000/profile/p?q=5",
                 "body": {"id": 1, "name": "lihil"}, "comment": "not a field"}
            ]"#,
        );

        let definitions = load(file.path()).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "ping");
        assert_eq!(definitions[0].threads, 2);
        assert_eq!(definitions[0].connections, 10);
        assert_eq!(definitions[0].duration, "5s");
        assert!(definitions[0].request_body().is_none());

        let complex = &definitions[1];
        assert_eq!(complex.threads, 4);
        assert_eq!(complex.connections, 64);
        assert_eq!(complex.duration, "10s");
        assert_eq!(complex.body, Some(serde_json::json!({"id": 1, "name": "lihil"})));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let file = temp_file(
            ".json",
            r#"[{"bench_name": "complex", "method": "POST", "url": "http://localhost:8000/x",
                 "data": {"a": 1}}]"#,
        );
        let definitions = load(file.path()).unwrap();
        assert_eq!(definitions[0].name, "complex");
        assert!(definitions[0].request_body().is_some());
    }

    #[test]
    fn loads_yaml_definitions() {
        let file = temp_file(
            ".yaml",
            r#"
- name: ping
  method: GET
  url: http://localhost:8000/ping
  headers:
    Accept: text/plain
"#,
        );
        let definitions = load(file.path()).unwrap();
        assert_eq!(definitions[0].headers.get("Accept").map(String::as_str), Some("text/plain"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load("/definitely/not/here/tests.json").unwrap_err();
        assert!(matches!(err, Error::ConfigError { .. }), "{err}");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let file = temp_file(".json", r#"[{"name": "ping""#);
        assert!(matches!(
            load(file.path()),
            Err(Error::ConfigError { .. })
        ));
    }

    #[test]
    fn rejects_invalid_definitions() {
        let cases = [
            r#"[{"name": "a", "method": "GET", "url": "http://h/", "duration": "soon"}]"#,
            r#"[{"name": "a", "method": "GET", "url": "http://h/", "threads": 0}]"#,
            r#"[{"name": "a", "method": "GET", "url": "http://h/", "threads": 8, "connections": 4}]"#,
            r#"[{"name": "a", "method": "GET", "url": "not a url"}]"#,
            r#"[{"name": "a", "method": "GET", "url": "http://h/"},
                {"name": "a", "method": "POST", "url": "http://h/"}]"#,
            r#"[{"name": "api/users", "method": "GET", "url": "http://h/"}]"#,
            r#"[{"name": "api\\users", "method": "GET", "url": "http://h/"}]"#,
            r#"[{"name": "..", "method": "GET", "url": "http://h/"}]"#,
            r#"[{"name": "/etc", "method": "GET", "url": "http://h/"}]"#,
        ];
        for case in cases {
            let file = temp_file(".json", case);
            assert!(
                matches!(load(file.path()), Err(Error::ConfigError { .. })),
                "accepted: {case}"
            );
        }
    }

    #[test]
    fn empty_body_counts_as_absent() {
        let file = temp_file(
            ".json",
            r#"[{"name": "a", "method": "POST", "url": "http://h/", "body": {}}]"#,
        );
        assert!(load(file.path()).unwrap()[0].request_body().is_none());
    }

    #[test]
    fn target_url_uses_framework_port() {
        let file = temp_file(
            ".json",
            r#"[{"name": "complex", "method": "POST", "url": "http://localhost:8000/profile/p?q=5"}]"#,
        );
        let definition = &load(file.path()).unwrap()[0];
        assert_eq!(
            definition.target_url(9100).unwrap(),
            "http://localhost:9100/profile/p?q=5"
        );
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let file = temp_file(
            ".yaml",
            r#"
results: out/results.json
server:
  cooldown_secs: 0
  readiness:
    type: http
frameworks:
  - key: lihil
    name: Lihil
    type: asgi
"#,
        );
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.results, PathBuf::from("out/results.json"));
        assert_eq!(settings.tests, PathBuf::from("config/tests.json"));
        assert_eq!(settings.server.cooldown(), Duration::ZERO);
        assert_eq!(settings.server.stop_timeout_secs, 5);
        assert_eq!(
            settings.server.readiness,
            Readiness::Http {
                path: "/".to_string()
            }
        );
        assert_eq!(settings.wrk, WrkSettings::default());
        assert_eq!(settings.frameworks.len(), 1);
        assert!(settings.graphs.is_none());
    }

    #[test]
    fn environment_overrides_apply() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            "BENCH_WRK" => Some("/opt/wrk/bin/wrk".to_string()),
            "BENCH_RESULTS" => Some("results.json".to_string()),
            _ => None,
        });
        assert_eq!(settings.wrk.command, vec!["/opt/wrk/bin/wrk"]);
        assert_eq!(settings.results, PathBuf::from("results.json"));
        assert_eq!(settings.tests, PathBuf::from("config/tests.json"));
    }

    #[test]
    fn duplicate_framework_keys_are_rejected() {
        let mut settings = Settings::default();
        settings.frameworks.push(crate::framework::FrameworkDescriptor::asgi("Lihil"));
        assert!(matches!(
            settings.validate(Path::new("bench.yaml")),
            Err(Error::ConfigError { .. })
        ));
    }

    #[test]
    fn bundled_config_files_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let settings = Settings::from_file(&root.join(DEFAULT_SETTINGS_PATH)).unwrap();
        settings.validate(Path::new(DEFAULT_SETTINGS_PATH)).unwrap();
        assert_eq!(settings.frameworks, framework::default_frameworks());
        assert_eq!(settings.server, ServerSettings::default());
        assert!(settings.graphs.is_some());

        let definitions = load(root.join(&settings.tests)).unwrap();
        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "profile"]);
    }

    #[test]
    fn run_duration_units() {
        let file = temp_file(
            ".yaml",
            r#"
- { name: bare, method: GET, url: "http://h/", duration: "30" }
- { name: secs, method: GET, url: "http://h/", duration: 45s }
- { name: mins, method: GET, url: "http://h/", duration: 2m }
- { name: hours, method: GET, url: "http://h/", duration: 1h }
"#,
        );
        let durations: Vec<Duration> = load(file.path())
            .unwrap()
            .iter()
            .map(|d| d.run_duration().unwrap())
            .collect();
        assert_eq!(
            durations,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(45),
                Duration::from_secs(120),
                Duration::from_secs(3600),
            ]
        );
    }

    #[test]
    fn settings_errors_name_the_file_they_came_from() {
        let file = temp_file(".yaml", "frameworks: []\n");
        match Settings::load(Some(file.path())) {
            Err(Error::ConfigError { path, reason }) => {
                assert_eq!(path, file.path());
                assert!(reason.contains("no frameworks"), "{reason}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
