//! Per-package outcome reports and the final migration summary

use std::fmt;
use tabled::builder::Builder;
use tabled::settings::{Panel, Style};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl TransferStatus {
    /// Outcome of a package whose validation passed
    pub fn classify(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => TransferStatus::Success,
            (0, _) => TransferStatus::Failed,
            _ => TransferStatus::PartialSuccess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Success => "Success",
            TransferStatus::PartialSuccess => "Partial Success",
            TransferStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one package, sent once by the worker that processed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub package_name: String,
    pub target_name: String,
    /// Raw type label, since unsupported types are reported too
    pub package_type: String,
    pub status: TransferStatus,
    pub versions_attempted: usize,
    pub versions_succeeded: usize,
    pub versions_skipped: usize,
    pub errors: Vec<String>,
}

impl TransferReport {
    /// Report for a package rejected before any version was attempted
    pub fn rejected(package_name: &str, package_type: &str, error: String) -> Self {
        Self {
            package_name: package_name.to_string(),
            target_name: package_name.to_string(),
            package_type: package_type.to_string(),
            status: TransferStatus::Failed,
            versions_attempted: 0,
            versions_succeeded: 0,
            versions_skipped: 0,
            errors: vec![error],
        }
    }

    pub fn error_summary(&self) -> String {
        self.errors.join("; ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub reports: Vec<TransferReport>,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, report: TransferReport) {
        match report.status {
            TransferStatus::Success => self.successful += 1,
            TransferStatus::PartialSuccess => self.partial += 1,
            TransferStatus::Failed => self.failed += 1,
        }
        self.reports.push(report);
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Table of every package followed by the aggregate counts
    pub fn render(&self) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Package", "Target", "Type", "Status", "Versions", "Error"]);

        let mut reports: Vec<&TransferReport> = self.reports.iter().collect();
        reports.sort_by(|a, b| {
            a.package_type
                .cmp(&b.package_type)
                .then_with(|| a.package_name.cmp(&b.package_name))
        });

        for report in reports {
            let versions = if report.versions_skipped > 0 {
                format!(
                    "{}/{} ({} skipped)",
                    report.versions_succeeded, report.versions_attempted, report.versions_skipped
                )
            } else {
                format!("{}/{}", report.versions_succeeded, report.versions_attempted)
            };
            let error = match report.status {
                TransferStatus::Success => String::new(),
                _ => report.error_summary(),
            };
            builder.push_record([
                report.package_name.clone(),
                report.target_name.clone(),
                report.package_type.to_lowercase(),
                report.status.to_string(),
                versions,
                error,
            ]);
        }

        let table = builder
            .build()
            .with(Panel::header("Migration Summary"))
            .with(Style::rounded())
            .to_string();

        format!(
            "{}\nSuccessful: {}\nPartial Success: {}\nFailed: {}\n",
            table, self.successful, self.partial, self.failed
        )
    }
}

/// Fan-in of package reports from concurrent workers
pub struct ResultAggregator {
    receiver: mpsc::Receiver<TransferReport>,
}

impl ResultAggregator {
    pub fn channel(buffer: usize) -> (mpsc::Sender<TransferReport>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }

    /// Consume reports until every sender is dropped
    pub async fn drain(mut self) -> SyncSummary {
        let mut summary = SyncSummary::default();
        while let Some(report) = self.receiver.recv().await {
            summary.record(report);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, status: TransferStatus, errors: &[&str]) -> TransferReport {
        TransferReport {
            package_name: name.to_string(),
            target_name: name.to_string(),
            package_type: "NPM".to_string(),
            status,
            versions_attempted: 2,
            versions_succeeded: 1,
            versions_skipped: 0,
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn classification_law() {
        assert_eq!(TransferStatus::classify(3, 0), TransferStatus::Success);
        assert_eq!(TransferStatus::classify(0, 0), TransferStatus::Success);
        assert_eq!(TransferStatus::classify(1, 2), TransferStatus::PartialSuccess);
        assert_eq!(TransferStatus::classify(0, 2), TransferStatus::Failed);
    }

    #[tokio::test]
    async fn drain_waits_for_every_sender() {
        let (sender, aggregator) = ResultAggregator::channel(4);
        let handle = tokio::spawn(aggregator.drain());

        let late = sender.clone();
        sender
            .send(report("@acme/a", TransferStatus::Success, &[]))
            .await
            .unwrap();
        drop(sender);
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        late.send(report("@acme/b", TransferStatus::Failed, &["boom"]))
            .await
            .unwrap();
        drop(late);

        let summary = handle.await.unwrap();
        assert_eq!(summary.total(), 2);
        assert_eq!((summary.successful, summary.partial, summary.failed), (1, 0, 1));
    }

    #[test]
    fn render_lists_errors_for_non_success_rows() {
        let mut summary = SyncSummary::default();
        summary.record(report("@acme/ok", TransferStatus::Success, &["ignored"]));
        summary.record(report("@acme/half", TransferStatus::PartialSuccess, &["v1: timeout", "v2: 500"]));

        let rendered = summary.render();
        assert!(rendered.contains("Migration Summary"));
        assert!(rendered.contains("v1: timeout; v2: 500"));
        assert!(!rendered.contains("ignored"));
        assert!(rendered.ends_with("Successful: 1\nPartial Success: 1\nFailed: 0\n"));
    }
}
