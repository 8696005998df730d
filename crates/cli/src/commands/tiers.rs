//! Membership tier commands.
//!
//! # Seed file format
//!
//! ```yaml
//! - name: Bronze
//!   rank: 0
//!   is_default: true
//! - name: Silver
//!   rank: 1
//!   order_threshold: 3
//!   spend_threshold_cents: 25000
//!   points_multiplier: "1.25"
//!   discount_percent: "5"
//! ```
//!
//! Tiers are matched by name, so re-running a seed updates in place.

use std::path::Path;

use sagebrush_server::config::LoyaltyConfig;
use sagebrush_server::db::TierRepository;
use sagebrush_server::models::{TierInput, ValidationError};
use sagebrush_server::services::LoyaltyService;

use super::{CommandError, connect};

/// Parse and validate a seed file without touching the database.
fn parse_seed(content: &str) -> Result<Vec<TierInput>, CommandError> {
    let tiers: Vec<TierInput> = serde_yaml::from_str(content)?;

    let mut names = std::collections::HashSet::new();
    let mut validated = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let name = tier.name.clone();
        let tier = tier
            .validate()
            .map_err(|e| ValidationError(format!("tier '{name}': {e}")))?;
        if !names.insert(tier.name.to_lowercase()) {
            return Err(ValidationError(format!("tier '{}' appears twice", tier.name)).into());
        }
        validated.push(tier);
    }
    Ok(validated)
}

/// Create or update tiers from a YAML file.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or a database
/// write fails.
pub async fn seed(path: &Path) -> Result<(), CommandError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let tiers = parse_seed(&content)?;
    tracing::info!("Parsed {} tier(s) from {}", tiers.len(), path.display());

    let pool = connect().await?;
    let repo = TierRepository::new(&pool);
    for input in &tiers {
        let tier = repo.upsert_by_name(input).await?;
        tracing::info!(
            "  {} (rank {}, id {}): {} orders or {} spend, x{} points",
            tier.name,
            tier.rank,
            tier.id,
            tier.order_threshold,
            tier.spend_threshold_cents,
            tier.points_multiplier
        );
    }

    tracing::info!("Seeding complete!");
    Ok(())
}

/// Recompute every customer's tier.
///
/// # Errors
///
/// Returns an error if the customer list cannot be loaded.
pub async fn evaluate_all() -> Result<(), CommandError> {
    let config = LoyaltyConfig::from_env()?;
    let pool = connect().await?;

    let summary = LoyaltyService::new(&pool, &config).evaluate_all().await?;

    tracing::info!("Tier evaluation complete!");
    tracing::info!("  Customers evaluated: {}", summary.evaluated);
    tracing::info!("  Tiers changed: {}", summary.changed);
    if summary.failed > 0 {
        tracing::warn!("  Failures: {}", summary.failed);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_seed_applies_defaults() {
        let tiers = parse_seed(
            r#"
- name: Bronze
  rank: 0
  is_default: true
- name: Silver
  rank: 1
  order_threshold: 3
  spend_threshold_cents: 25000
  points_multiplier: "1.25"
"#,
        )
        .unwrap();

        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].points_multiplier, Decimal::ONE);
        assert!(tiers[0].is_active);
        assert_eq!(tiers[1].order_threshold, 3);
        assert_eq!(tiers[1].points_multiplier, Decimal::new(125, 2));
    }

    #[test]
    fn test_parse_seed_rejects_duplicate_names() {
        let err = parse_seed(
            r"
- name: Gold
  rank: 2
- name: gold
  rank: 3
",
        )
        .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_parse_seed_names_the_invalid_tier() {
        let err = parse_seed(
            r"
- name: Platinum
  rank: 4
  order_threshold: -1
",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Platinum"));
    }
}
