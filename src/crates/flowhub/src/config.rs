//! Environment-driven server configuration

use std::time::Duration;

/// All environment-recognized options of the service
///
/// Every field has a default suitable for local development; production
/// deployments set the corresponding `FLOWHUB_*` variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite connection string
    pub database_url: String,
    /// HTTP bind address
    pub bind_addr: String,
    /// Search index endpoint
    pub search_endpoint: String,
    /// Search index API key
    pub search_api_key: String,
    /// Max concurrent node evaluations per execution
    pub max_concurrency: usize,
    /// Per-node re-entry cap
    pub reentry_cap: u32,
    /// Checkpoint cadence in node completions
    pub checkpoint_every: u64,
    /// Default daily quota for new users
    pub quota_limit_per_day: i64,
    /// Product Hunt quality gate (votes)
    pub producthunt_min_votes: i64,
    /// Product Hunt crawl interval
    pub producthunt_every: Duration,
    /// GitHub Trending crawl interval
    pub github_every: Duration,
    /// ArXiv crawl interval
    pub arxiv_every: Duration,
    /// Checkpoint retention horizon for terminal executions
    pub checkpoint_retention: Duration,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_or(name, default_secs))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
            search_endpoint: "http://127.0.0.1:7700".to_string(),
            search_api_key: String::new(),
            max_concurrency: 4,
            reentry_cap: 32,
            checkpoint_every: 1,
            quota_limit_per_day: 100,
            producthunt_min_votes: 100,
            producthunt_every: Duration::from_secs(24 * 3600),
            github_every: Duration::from_secs(12 * 3600),
            arxiv_every: Duration::from_secs(24 * 3600),
            checkpoint_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the environment
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("FLOWHUB_DATABASE_URL")
                .unwrap_or(defaults.database_url),
            bind_addr: std::env::var("FLOWHUB_BIND_ADDR").unwrap_or(defaults.bind_addr),
            search_endpoint: std::env::var("FLOWHUB_SEARCH_ENDPOINT")
                .unwrap_or(defaults.search_endpoint),
            search_api_key: std::env::var("FLOWHUB_SEARCH_API_KEY")
                .unwrap_or(defaults.search_api_key),
            max_concurrency: env_or("FLOWHUB_MAX_CONCURRENCY", defaults.max_concurrency),
            reentry_cap: env_or("FLOWHUB_REENTRY_CAP", defaults.reentry_cap),
            checkpoint_every: env_or("FLOWHUB_CHECKPOINT_EVERY", defaults.checkpoint_every),
            quota_limit_per_day: env_or("FLOWHUB_QUOTA_PER_DAY", defaults.quota_limit_per_day),
            producthunt_min_votes: env_or(
                "FLOWHUB_PRODUCTHUNT_MIN_VOTES",
                defaults.producthunt_min_votes,
            ),
            producthunt_every: env_secs(
                "FLOWHUB_PRODUCTHUNT_EVERY_SECS",
                defaults.producthunt_every.as_secs(),
            ),
            github_every: env_secs("FLOWHUB_GITHUB_EVERY_SECS", defaults.github_every.as_secs()),
            arxiv_every: env_secs("FLOWHUB_ARXIV_EVERY_SECS", defaults.arxiv_every.as_secs()),
            checkpoint_retention: env_secs(
                "FLOWHUB_CHECKPOINT_RETENTION_SECS",
                defaults.checkpoint_retention.as_secs(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.reentry_cap, 32);
        assert_eq!(config.producthunt_min_votes, 100);
    }
}
