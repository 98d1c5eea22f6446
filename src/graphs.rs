use std::time::Duration;

use crate::config::GraphSettings;
use crate::exec_utils::command_from_argv;
use crate::prelude::*;

/// Runs the external chart command. Failures are logged, never returned.
pub async fn regenerate(settings: &GraphSettings) -> bool {
    let result = async {
        let mut cmd = command_from_argv(&settings.command)?;
        exec(&mut cmd, Duration::from_secs(settings.timeout_secs)).await
    }
    .await;

    match result {
        Ok(_) => {
            info!("Generated updated graphs ({})", settings.command.join(" "));
            true
        }
        Err(e) => {
            error!("Error generating graphs: {}", e);
            false
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn graphs(script: &str) -> GraphSettings {
        GraphSettings {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn reports_success() {
        assert!(regenerate(&graphs("true")).await);
    }

    #[tokio::test]
    async fn swallows_failures() {
        assert!(!regenerate(&graphs("exit 2")).await);
        assert!(!regenerate(&GraphSettings {
            command: vec!["/nonexistent/plotter".to_string()],
            timeout_secs: 5,
        })
        .await);
    }
}
