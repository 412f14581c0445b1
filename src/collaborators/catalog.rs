use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::order::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogPrice {
    pub base: Decimal,
    pub net_with_tax: Decimal,
}

/// Price lookup for budget submission. `Ok(None)` means the key is unknown.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn price_for(&self, service_key: &str) -> anyhow::Result<Option<CatalogPrice>>;
}

/// Fixed price list with a single tax rate, loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    tax_rate: Decimal,
    base_prices: HashMap<String, Decimal>,
}

impl StaticCatalog {
    pub fn new(tax_rate: Decimal, base_prices: HashMap<String, Decimal>) -> Self {
        Self {
            tax_rate,
            base_prices,
        }
    }

    pub fn net_price(&self, base: Decimal) -> Decimal {
        round_money(base * (Decimal::ONE + self.tax_rate))
    }
}

#[async_trait]
impl CatalogLookup for StaticCatalog {
    async fn price_for(&self, service_key: &str) -> anyhow::Result<Option<CatalogPrice>> {
        Ok(self.base_prices.get(service_key).map(|base| CatalogPrice {
            base: *base,
            net_with_tax: self.net_price(*base),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticCatalog {
        let prices = HashMap::from([
            ("boring".to_string(), Decimal::new(10000, 2)),
            ("valve_grinding".to_string(), Decimal::new(3333, 2)),
        ]);
        StaticCatalog::new(Decimal::new(16, 2), prices)
    }

    #[tokio::test]
    async fn test_net_price_includes_tax() {
        let price = catalog().price_for("boring").await.unwrap().unwrap();
        assert_eq!(price.base, Decimal::new(100, 0));
        assert_eq!(price.net_with_tax, Decimal::new(11600, 2));
    }

    #[tokio::test]
    async fn test_net_price_is_rounded_to_cents() {
        // 33.33 * 1.16 = 38.6628
        let price = catalog().price_for("valve_grinding").await.unwrap().unwrap();
        assert_eq!(price.net_with_tax, Decimal::new(3866, 2));
    }

    #[tokio::test]
    async fn test_unknown_key() {
        assert!(catalog().price_for("teleport").await.unwrap().is_none());
    }
}
