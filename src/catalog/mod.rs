//! Paginated, rate-limit aware retrieval of an organization's package catalog
//!
//! The fetch is all-or-nothing: any page or probe failure aborts the whole
//! fetch and discards pages already received.

pub mod graphql;

pub use graphql::GraphQlCatalogClient;

use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::model::{Package, PackageType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Remaining budget reported by the catalog service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PackagePage {
    pub nodes: Vec<Package>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Remote catalog service
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn rate_limit(&self) -> Result<RateLimit>;

    async fn fetch_page(
        &self,
        organization: &str,
        filter: Option<PackageType>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PackagePage>;
}

pub struct CatalogFetcher {
    source: Arc<dyn CatalogSource>,
    page_size: u32,
    output: Logger,
}

impl CatalogFetcher {
    pub fn new(source: Arc<dyn CatalogSource>, output: Logger) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            output,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch every package of `organization`, in page order
    pub async fn fetch(
        &self,
        organization: &str,
        filter: Option<PackageType>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let mut packages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_number = 1u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            self.wait_for_budget(cancel).await?;

            self.output.detail(&format!(
                "Requesting catalog page {} for {}",
                page_number, organization
            ));
            let page = self
                .source
                .fetch_page(organization, filter, cursor.as_deref(), self.page_size)
                .await
                .map_err(|e| fetch_error(&format!("page {}", page_number), e))?;

            packages.extend(page.nodes);

            if !page.has_next_page {
                break;
            }
            match page.end_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(SyncError::Fetch(format!(
                        "page {} reported more results without a cursor",
                        page_number
                    )));
                }
            }
            page_number += 1;
        }

        self.output.info(&format!(
            "Fetched {} package(s) from {} in {} page(s)",
            packages.len(),
            organization,
            page_number
        ));
        Ok(packages)
    }

    /// Block until the declared reset time when the budget is exhausted
    async fn wait_for_budget(&self, cancel: &CancellationToken) -> Result<()> {
        let limit = self
            .source
            .rate_limit()
            .await
            .map_err(|e| fetch_error("rate limit probe", e))?;

        if limit.remaining > 0 {
            return Ok(());
        }

        let wait = time_until(limit.reset_at);
        self.output.warning(&format!(
            "Rate limit exhausted, waiting {} until {}",
            self.output.format_duration(wait),
            limit.reset_at.to_rfc3339()
        ));

        tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

fn time_until(reset_at: DateTime<Utc>) -> Duration {
    (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

fn fetch_error(context: &str, err: SyncError) -> SyncError {
    match err {
        SyncError::Cancelled | SyncError::Fetch(_) => err,
        other => SyncError::Fetch(format!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Statistics;
    use std::sync::Mutex;

    fn pkg(name: &str) -> Package {
        Package {
            id: format!("id-{}", name),
            name: name.to_string(),
            package_type: "NPM".to_string(),
            visibility: None,
            repository: None,
            statistics: Statistics::default(),
            versions: Vec::new(),
        }
    }

    struct PagedSource {
        pages: Vec<Result<PackagePage>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl CatalogSource for PagedSource {
        async fn rate_limit(&self) -> Result<RateLimit> {
            Ok(RateLimit {
                remaining: 5000,
                reset_at: Utc::now(),
            })
        }

        async fn fetch_page(
            &self,
            _organization: &str,
            _filter: Option<PackageType>,
            cursor: Option<&str>,
            _page_size: u32,
        ) -> Result<PackagePage> {
            let mut cursors = self.cursors.lock().unwrap();
            let index = cursors.len();
            cursors.push(cursor.map(str::to_string));
            match &self.pages[index] {
                Ok(page) => Ok(page.clone()),
                Err(e) => Err(SyncError::Network(e.to_string())),
            }
        }
    }

    fn page(names: &[&str], next: Option<&str>) -> Result<PackagePage> {
        Ok(PackagePage {
            nodes: names.iter().map(|n| pkg(n)).collect(),
            has_next_page: next.is_some(),
            end_cursor: next.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn concatenates_pages_in_order() {
        let source = Arc::new(PagedSource {
            pages: vec![page(&["a", "b"], Some("c1")), page(&["c"], Some("c2")), page(&["d"], None)],
            cursors: Mutex::new(Vec::new()),
        });
        let fetcher = CatalogFetcher::new(source.clone(), Logger::new_quiet());
        let packages = fetcher
            .fetch("acme", None, &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *source.cursors.lock().unwrap(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn page_error_discards_everything() {
        let source = Arc::new(PagedSource {
            pages: vec![
                page(&["a"], Some("c1")),
                Err(SyncError::Network("connection reset".to_string())),
            ],
            cursors: Mutex::new(Vec::new()),
        });
        let fetcher = CatalogFetcher::new(source, Logger::new_quiet());
        let err = fetcher
            .fetch("acme", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fetch(ref msg) if msg.contains("page 2")));
    }

    #[tokio::test]
    async fn cancelled_before_first_page() {
        let source = Arc::new(PagedSource {
            pages: vec![page(&["a"], None)],
            cursors: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = CatalogFetcher::new(source.clone(), Logger::new_quiet());
        assert!(matches!(
            fetcher.fetch("acme", None, &cancel).await,
            Err(SyncError::Cancelled)
        ));
        assert!(source.cursors.lock().unwrap().is_empty());
    }

    #[test]
    fn past_reset_means_no_wait() {
        assert_eq!(time_until(Utc::now() - chrono::Duration::seconds(3)), Duration::ZERO);
    }
}
