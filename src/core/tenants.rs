//! Tenant enumeration for the daily run.

use crate::store::SubscriptionStore;
use std::collections::BTreeSet;
use tracing::{error, info};

/// Lists the tenants that own at least one active subscription.
///
/// Ids are returned exactly as stored, since the store matches tenant ids exactly;
/// only blank ids are dropped.
///
/// A store failure is logged and yields an empty set: the run then does nothing for
/// this cycle and the next scheduled run tries again.
pub async fn list_active_tenants(store: &dyn SubscriptionStore) -> BTreeSet<String> {
    match store.distinct_active_tenant_ids().await {
        Ok(ids) => {
            let tenants: BTreeSet<String> = ids
                .into_iter()
                .filter(|id| !id.trim().is_empty())
                .collect();
            info!(count = tenants.len(), "Enumerated active tenants");
            tenants
        }
        Err(e) => {
            error!(error = %e, "Failed to enumerate tenants, skipping this cycle");
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::Result, test_utils::*};

    #[tokio::test]
    async fn test_list_active_tenants_drops_blank_ids() -> Result<()> {
        let store = setup_test_store().await?;
        let db = store.connection();
        insert_subscription(db, test_subscription("a1", "acme")).await?;
        insert_subscription(db, test_subscription("a2", "acme")).await?;
        insert_subscription(db, test_subscription("g1", "globex")).await?;
        insert_subscription(db, test_subscription("x1", "  ")).await?;

        let tenants = list_active_tenants(&store).await;
        assert_eq!(
            tenants.into_iter().collect::<Vec<_>>(),
            vec!["acme".to_string(), "globex".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_padded_tenant_id_is_kept_verbatim() -> Result<()> {
        let store = setup_test_store().await?;
        insert_subscription(store.connection(), test_subscription("p1", " acme")).await?;

        let tenants = list_active_tenants(&store).await;
        assert_eq!(tenants.into_iter().collect::<Vec<_>>(), vec![" acme".to_string()]);
        assert_eq!(store.get_subscriptions(" acme").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_active_tenants_degrades_to_empty_on_error() -> Result<()> {
        let store = FaultyStore::new(setup_test_store().await?).failing_tenant_listing();
        insert_subscription(store.inner().connection(), test_subscription("a1", "acme")).await?;

        assert!(list_active_tenants(&store).await.is_empty());
        Ok(())
    }
}
