//! GraphQL catalog client for the source package registry

use crate::catalog::{CatalogSource, PackagePage, RateLimit};
use crate::error::handlers::HttpErrorHandler;
use crate::error::{Result, SyncError};
use crate::model::{File, Package, PackageType, Repository, Statistics, Version, Visibility};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const RATE_LIMIT_QUERY: &str = "query { rateLimit { remaining resetAt } }";

const PACKAGES_QUERY: &str = r#"
query($login: String!, $first: Int!, $after: String, $packageType: PackageType) {
  organization(login: $login) {
    packages(first: $first, after: $after, packageType: $packageType) {
      pageInfo { endCursor hasNextPage }
      nodes {
        id
        name
        packageType
        repository { name url }
        statistics { downloadsTotalCount }
        versions(first: 100) {
          nodes {
            id
            version
            files(first: 100) { nodes { name size sha256 url } }
            createdAt
            updatedAt
          }
        }
      }
    }
  }
}"#;

pub struct GraphQlCatalogClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl GraphQlCatalogClient {
    pub fn new(client: Client, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value, context: &str) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| HttpErrorHandler::handle_network_error(&e, context))?;

        let response = HttpErrorHandler::check(response, context).await?;
        let body: GraphQlResponse<T> = response.json().await?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::Fetch(format!("{}: {}", context, messages.join("; "))));
        }
        body.data
            .ok_or_else(|| SyncError::Fetch(format!("{}: response carried no data", context)))
    }
}

#[async_trait]
impl CatalogSource for GraphQlCatalogClient {
    async fn rate_limit(&self) -> Result<RateLimit> {
        let data: RateLimitData = self
            .query(RATE_LIMIT_QUERY, json!({}), "rate limit query")
            .await?;
        Ok(RateLimit {
            remaining: data.rate_limit.remaining,
            reset_at: data.rate_limit.reset_at,
        })
    }

    async fn fetch_page(
        &self,
        organization: &str,
        filter: Option<PackageType>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<PackagePage> {
        let variables = json!({
            "login": organization,
            "first": page_size,
            "after": cursor,
            "packageType": filter.map(|t| t.graphql_name()),
        });
        let data: OrganizationData = self
            .query(PACKAGES_QUERY, variables, "package query")
            .await?;

        let organization = data.organization.ok_or_else(|| {
            SyncError::Fetch(format!("organization '{}' not found", organization))
        })?;
        let packages = organization.packages;

        Ok(PackagePage {
            nodes: packages.nodes.into_iter().map(PackageNode::into_package).collect(),
            has_next_page: packages.page_info.has_next_page,
            end_cursor: packages.page_info.end_cursor,
        })
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitData {
    rate_limit: RateLimitNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitNode {
    remaining: u64,
    reset_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: Option<OrganizationNode>,
}

#[derive(Deserialize)]
struct OrganizationNode {
    packages: PackageConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<PackageNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageNode {
    id: String,
    name: String,
    package_type: String,
    repository: Option<Repository>,
    /// Not part of the query; decoded when a server includes it anyway
    #[serde(default)]
    visibility: Option<String>,
    statistics: Option<StatisticsNode>,
    versions: Connection<VersionNode>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsNode {
    downloads_total_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionNode {
    id: String,
    version: String,
    files: Connection<FileNode>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Deserialize)]
struct FileNode {
    name: String,
    size: Option<u64>,
    sha256: Option<String>,
    url: Option<String>,
}

impl PackageNode {
    fn into_package(self) -> Package {
        Package {
            id: self.id,
            name: self.name,
            package_type: self.package_type,
            visibility: self.visibility.as_deref().and_then(Visibility::from_api),
            repository: self.repository,
            statistics: Statistics {
                downloads_total_count: self.statistics.map(|s| s.downloads_total_count).unwrap_or(0),
            },
            versions: self
                .versions
                .nodes
                .into_iter()
                .map(|v| Version {
                    id: v.id,
                    name: v.version,
                    created_at: v.created_at,
                    updated_at: v.updated_at,
                    files: v
                        .files
                        .nodes
                        .into_iter()
                        .map(|f| File {
                            name: f.name,
                            size: f.size.unwrap_or(0),
                            sha256: f.sha256.filter(|s| !s.is_empty()),
                            url: f.url.unwrap_or_default(),
                        })
                        .collect(),
                    metadata: serde_json::Map::new(),
                })
                .collect(),
        }
    }
}
