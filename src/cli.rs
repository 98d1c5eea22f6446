use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "wrk-bench")]
#[command(about = "Web framework benchmark harness", long_about = None)]
pub struct Cli {
    /// Only benchmark this framework (results are not saved)
    pub framework: Option<String>,

    /// Only run this benchmark
    #[arg(short, long)]
    pub test: Option<String>,

    #[arg(long)]
    pub list_frameworks: bool,

    #[arg(long)]
    pub list_tests: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Settings file, defaults to config/bench.yaml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub skip_graphs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_runs_everything() {
        let cli = Cli::try_parse_from(["wrk-bench"]).unwrap();
        assert!(cli.framework.is_none());
        assert!(cli.test.is_none());
        assert!(!cli.list_frameworks && !cli.list_tests && !cli.skip_graphs);
    }

    #[test]
    fn framework_and_test() {
        let cli = Cli::try_parse_from(["wrk-bench", "lihil", "--test", "ping", "-v"]).unwrap();
        assert_eq!(cli.framework.as_deref(), Some("lihil"));
        assert_eq!(cli.test.as_deref(), Some("ping"));
        assert!(cli.verbose);
    }

    #[test]
    fn config_and_flags() {
        let cli = Cli::try_parse_from([
            "wrk-bench",
            "-c",
            "bench.yaml",
            "--list-tests",
            "--skip-graphs",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bench.yaml")));
        assert!(cli.list_tests && cli.skip_graphs);
    }
}
