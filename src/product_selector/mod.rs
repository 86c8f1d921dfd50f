//! `selectWithFallback` — cheapest suitable product across fallback regions
//! (spec §4.6).

use tracing::{info, instrument};

use crate::domain::error::{Error, ErrorKind};
use crate::domain::product::{Availability, Product};
use crate::provider::service::ProviderService;

pub struct SelectedProduct {
    pub product: Product,
    pub region: String,
}

/// Builds the ordered region list: `preferredRegion` first (if any), then
/// the priority list in declared order, deduplicated.
fn region_search_order(preferred_region: Option<&str>, region_priority_list: &[String]) -> Vec<String> {
    let mut order = Vec::new();
    if let Some(region) = preferred_region {
        order.push(region.to_string());
    }
    for region in region_priority_list {
        if !order.contains(region) {
            order.push(region.clone());
        }
    }
    order
}

/// Orders candidates by ascending `spotPrice`, tie-breaking on lower
/// `onDemandPrice`, then lexicographic `id` (spec §4.6).
fn best_of(products: &[Product]) -> Option<&Product> {
    products.iter().min_by(|a, b| {
        a.spot_price
            .partial_cmp(&b.spot_price)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.on_demand_price
                    .partial_cmp(&b.on_demand_price)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    })
}

#[instrument(skip(provider))]
pub async fn select_with_fallback(
    provider: &ProviderService,
    product_name: &str,
    preferred_region: Option<&str>,
    region_priority_list: &[String],
    request_id: &str,
) -> Result<SelectedProduct, Error> {
    let regions = region_search_order(preferred_region, region_priority_list);
    for region in &regions {
        let candidates = provider.list_products(product_name, region, request_id).await?;
        let available: Vec<Product> = candidates
            .into_iter()
            .filter(|p| matches!(p.availability, Availability::Available | Availability::Limited))
            .collect();
        match best_of(&available) {
            Some(product) => {
                return Ok(SelectedProduct {
                    product: product.clone(),
                    region: region.clone(),
                });
            }
            None => {
                info!(region, product_name, "no available product in region, trying next");
            }
        }
    }
    Err(Error::new(
        ErrorKind::NoOptimalProductAnyRegion,
        "no optimal product found in any attempted region",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, spot: f64, on_demand: f64) -> Product {
        Product {
            id: id.to_string(),
            name: "RTX 4090".to_string(),
            region: "r1".to_string(),
            spot_price: spot,
            on_demand_price: on_demand,
            gpu_type: "RTX4090".to_string(),
            gpu_memory: 24,
            availability: Availability::Available,
        }
    }

    #[test]
    fn region_order_dedupes_preferred_against_priority_list() {
        let order = region_search_order(Some("r1"), &["r1".to_string(), "r2".to_string()]);
        assert_eq!(order, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn region_order_with_no_preferred() {
        let order = region_search_order(None, &["r2".to_string(), "r3".to_string()]);
        assert_eq!(order, vec!["r2".to_string(), "r3".to_string()]);
    }

    #[test]
    fn best_of_picks_lowest_spot_price() {
        let products = vec![product("p2", 0.60, 1.0), product("p1", 0.45, 1.0)];
        assert_eq!(best_of(&products).unwrap().id, "p1");
    }

    #[test]
    fn tie_break_on_on_demand_price_then_id() {
        let products = vec![product("pb", 0.5, 1.2), product("pa", 0.5, 1.0)];
        assert_eq!(best_of(&products).unwrap().id, "pa");
        let products = vec![product("pb", 0.5, 1.0), product("pa", 0.5, 1.0)];
        assert_eq!(best_of(&products).unwrap().id, "pa");
    }

    #[test]
    fn empty_candidates_returns_none() {
        let products: Vec<Product> = vec![];
        assert!(best_of(&products).is_none());
    }
}
