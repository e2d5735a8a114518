//! Search over cached keys.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::memory::InMemoryCacheStore;
use crate::cli::context::{build_registry, load_config, CliContext, MissingSources};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{CacheData, Config, RequestContext, SearchQuery, SearchResultSet};
use crate::domain::ports::{CacheStore, ContextPermissionEvaluator};
use crate::services::{ProviderRegistry, SearchIndex, ShadowIndex};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to look for in cache keys
    #[arg(default_value = "")]
    pub query: String,

    /// Restrict to a cache type (repeatable)
    #[arg(long = "type", value_name = "TYPE")]
    pub types: Vec<String>,

    /// Field filter as key=value; values may list comma-separated alternatives
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Page size (defaults to search.default_page_size)
    #[arg(long)]
    pub size: Option<usize>,

    /// Search a JSON snapshot ({type: [cacheData]}) instead of the database
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Only return results from these accounts (repeatable)
    #[arg(long = "account", value_name = "ACCOUNT")]
    pub accounts: Vec<String>,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SearchOutput(pub SearchResultSet);

impl CommandOutput for SearchOutput {
    fn to_human(&self) -> String {
        let set = &self.0;
        if set.results.is_empty() {
            return format!("No results for '{}' ({} matches).", set.query, set.total_matches);
        }

        let mut lines = vec![format!(
            "{} matches for '{}' (page {}, size {}):",
            set.total_matches, set.query, set.page_number, set.page_size
        )];
        for result in &set.results {
            let field = |name: &str| result.get(name).and_then(|v| v.as_str()).unwrap_or("-");
            let mut line = format!(
                "  {}:{} {}/{} {}",
                field("provider"),
                field("type"),
                field("account"),
                field("location"),
                field("name")
            );
            if let Some(url) = result.get("url").and_then(|v| v.as_str()) {
                line.push_str(&format!("  {}", truncate(url, 60)));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

pub async fn execute(args: SearchArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let (registry, config) = match &args.snapshot {
        Some(path) => {
            let store = load_snapshot(path).await?;
            (build_registry(&config, store, None, MissingSources::Empty)?, config)
        }
        None => {
            let ctx = CliContext::open(config, None, MissingSources::Empty).await?;
            (ctx.registry, ctx.config)
        }
    };

    let index = build_index(&registry, &config).await?;

    let mut query = SearchQuery::new(args.query.clone())
        .with_types(args.types.clone())
        .page(args.page, args.size.unwrap_or(config.search.default_page_size));
    for (key, value) in args.filters {
        query = query.with_filter(key, value);
    }

    let request = if args.accounts.is_empty() {
        RequestContext::system()
    } else {
        RequestContext::new(None, Some(args.accounts.into_iter().collect::<BTreeSet<_>>()))
    };

    let results = index.search(&query, &request).await.context("Search failed")?;
    output(&SearchOutput(results), json_mode);
    Ok(())
}

async fn build_index(registry: &ProviderRegistry, config: &Config) -> Result<SearchIndex> {
    let mut index = SearchIndex::new(registry, Arc::new(ContextPermissionEvaluator))?;
    if config.search.shadow_index_enabled {
        let shadow = Arc::new(ShadowIndex::new(config.search.shadow_index_types.clone()));
        let indexed = shadow
            .refresh(registry.store().as_ref())
            .await
            .context("Failed to build shadow index")?;
        tracing::debug!(indexed, "shadow index built for search");
        index = index.with_shadow_index(shadow);
    }
    Ok(index)
}

/// Load a `{type: [cacheData]}` JSON snapshot into an in-memory store.
async fn load_snapshot(path: &Path) -> Result<Arc<dyn CacheStore>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: BTreeMap<String, Vec<CacheData>> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid snapshot {}", path.display()))?;

    let store = InMemoryCacheStore::new();
    for (type_name, entries) in snapshot {
        for data in entries {
            store.put_cache_data(&type_name, data).await?;
        }
    }
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("account=prod,test").unwrap(),
            ("account".to_string(), "prod,test".to_string())
        );
        assert_eq!(
            parse_filter(" region = us-east-1 ").unwrap(),
            ("region".to_string(), "us-east-1".to_string())
        );
        assert!(parse_filter("account").is_err());
        assert!(parse_filter("=prod").is_err());
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            json!({
                "instances": [
                    {"id": "aws:instances:prod:us-east-1:i-1", "attributes": {"state": "running"}}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let store = load_snapshot(&path).await.unwrap();
        let ids = store.get_identifiers("instances").await.unwrap();
        assert_eq!(ids, vec!["aws:instances:prod:us-east-1:i-1".to_string()]);
    }

    #[test]
    fn test_human_output_lists_results() {
        let mut result = serde_json::Map::new();
        result.insert("provider".to_string(), json!("aws"));
        result.insert("type".to_string(), json!("instances"));
        result.insert("account".to_string(), json!("prod"));
        result.insert("location".to_string(), json!("us-east-1"));
        result.insert("name".to_string(), json!("i-1"));

        let mut set = SearchResultSet::empty(&SearchQuery::new("i-1"));
        set.total_matches = 1;
        set.results.push(result);

        let human = SearchOutput(set).to_human();
        assert!(human.contains("1 matches for 'i-1'"));
        assert!(human.contains("aws:instances prod/us-east-1 i-1"));
    }
}
