use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;

const ASGI_FRAMEWORKS: [&str; 6] = [
    "Lihil",
    "Starlette",
    "FastAPI",
    "Litestar",
    "Blacksheep",
    "Sanic",
];

/// Launch recipe for one server under test.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FrameworkDescriptor {
    pub key: String,
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(flatten)]
    pub launch: Launch,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Launch {
    /// Served by uvicorn; `module` defaults to `src.<key>:app`.
    Asgi {
        #[serde(default)]
        module: Option<String>,
    },
    /// Arbitrary argv, `{port}` is substituted in every argument.
    Command { command: Vec<String> },
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Launch {
    pub fn command(&self, key: &str, port: u16) -> Vec<String> {
        match self {
            Launch::Asgi { module } => {
                let module = module
                    .clone()
                    .unwrap_or_else(|| format!("src.{}:app", key));
                let port = port.to_string();
                [
                    "uv",
                    "run",
                    "uvicorn",
                    module.as_str(),
                    "--interface",
                    "asgi3",
                    "--http",
                    "httptools",
                    "--no-access-log",
                    "--log-level",
                    "warning",
                    "--port",
                    port.as_str(),
                ]
                .iter()
                .map(|s| s.to_string())
                .collect()
            }
            Launch::Command { command } => {
                let port = port.to_string();
                command.iter().map(|a| a.replace("{port}", &port)).collect()
            }
        }
    }
}

impl FrameworkDescriptor {
    pub fn asgi(name: &str) -> Self {
        FrameworkDescriptor {
            key: name.to_lowercase(),
            name: name.to_string(),
            port: DEFAULT_PORT,
            launch: Launch::Asgi { module: None },
        }
    }

    pub fn custom(name: &str, command: &[&str]) -> Self {
        FrameworkDescriptor {
            key: name.to_lowercase(),
            name: name.to_string(),
            port: DEFAULT_PORT,
            launch: Launch::Command {
                command: command.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn command(&self) -> Vec<String> {
        self.launch.command(&self.key, self.port)
    }
}

pub fn default_frameworks() -> Vec<FrameworkDescriptor> {
    let mut frameworks: Vec<FrameworkDescriptor> = ASGI_FRAMEWORKS
        .iter()
        .map(|name| FrameworkDescriptor::asgi(name))
        .collect();
    frameworks.push(FrameworkDescriptor::custom(
        "Robyn",
        &["uv", "run", "python", "-m", "src.robyn"],
    ));
    frameworks
}

pub fn find<'a>(
    frameworks: &'a [FrameworkDescriptor],
    key: &str,
) -> Option<&'a FrameworkDescriptor> {
    let key = key.to_lowercase();
    frameworks.iter().find(|f| f.key == key)
}
