#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::generator::types::PipelineError;
    use crate::generator::workflow::{TimingScope, failure_message, persist_document};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_timing_phases_keep_start_order() {
        let mut timing = TimingScope::new();
        timing.start_phase("parse-query");
        timing.end_phase("parse-query");
        timing.start_phase("search");
        timing.start_phase("analyze");
        timing.end_phase("analyze");
        timing.end_phase("search");

        let phases: Vec<&str> = timing
            .get_phase_durations()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(phases, vec!["parse-query", "analyze", "search"]);
    }

    #[test]
    fn test_end_unknown_phase_returns_none() {
        let mut timing = TimingScope::new();
        assert!(timing.end_phase("never-started").is_none());
        assert!(timing.get_phase_durations().is_empty());
    }

    #[test]
    fn test_timing_report_lists_phases() {
        let mut timing = TimingScope::new();
        timing.start_phase("summarize");
        std::thread::sleep(Duration::from_millis(2));
        let duration = timing.end_phase("summarize").unwrap();
        assert!(duration >= Duration::from_millis(2));

        let report = timing.generate_timing_report();
        assert!(report.starts_with("总执行时间"));
        assert!(report.contains("- summarize:"));
    }

    #[test]
    fn test_failure_message_wraps_error() {
        let message = failure_message(&PipelineError::NoPapersFound {
            query: "quantum llamas".to_string(),
        });
        assert!(message.starts_with("❌ An error occurred while processing your query:"));
        assert!(message.contains("quantum llamas"));
    }

    #[tokio::test]
    async fn test_persist_document_writes_when_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let mut output = Config::default().output;
        output.dir = temp_dir.path().to_path_buf();
        output.save = true;

        let path = persist_document(&output, "sparse attention", "# Doc")
            .await
            .unwrap();
        assert!(path.starts_with(temp_dir.path()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Doc");
    }

    #[tokio::test]
    async fn test_persist_document_failure_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // 输出目录位置被普通文件占用
        let occupied = temp_dir.path().join("results");
        std::fs::write(&occupied, "not a directory").unwrap();

        let mut output = Config::default().output;
        output.dir = occupied;
        output.save = true;

        assert_eq!(persist_document(&output, "sparse attention", "# Doc").await, None);
    }

    #[tokio::test]
    async fn test_persist_document_skipped_when_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let mut output = Config::default().output;
        output.dir = temp_dir.path().join("unused");
        output.save = false;

        assert_eq!(persist_document(&output, "sparse attention", "# Doc").await, None);
        assert!(!output.dir.exists());
    }
}
