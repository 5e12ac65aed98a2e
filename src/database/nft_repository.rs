//! NFT persistence repository
//!
//! Minted tokens are plain rows; the chain part is simulated upstream and
//! only the resulting identifiers land here. Metadata lives in
//! `metadata_uri` as JSON text and listing state in `nft_marketplace`.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::now_timestamp;
use crate::chain::MintedToken;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NftRow {
    pub id: i64,
    pub project_id: i64,
    pub token_id: Option<String>,
    pub contract_address: Option<String>,
    pub metadata_uri: Option<String>,
    pub owner_id: i64,
    pub asset_type: String,
    pub created_at: String,
}

/// NFT joined with its current owner
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NftWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub nft: NftRow,
    pub owner_username: Option<String>,
    pub owner_wallet_address: String,
}

/// Marketplace listing joined with token and seller details
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MarketplaceListing {
    pub id: i64,
    pub nft_id: i64,
    pub seller_id: i64,
    pub buyer_id: Option<i64>,
    pub price: f64,
    pub currency: String,
    pub status: String,
    pub sale_date: Option<String>,
    pub created_at: String,
    pub token_id: Option<String>,
    pub contract_address: Option<String>,
    pub metadata_uri: Option<String>,
    pub seller_username: Option<String>,
    pub seller_wallet_address: String,
    pub project_name: Option<String>,
    pub project_visibility: Option<String>,
}

/// Listing as loaded for a purchase attempt
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PurchasableListing {
    pub id: i64,
    pub nft_id: i64,
    pub seller_id: i64,
    pub price: f64,
    pub currency: String,
    pub seller_username: Option<String>,
}

// ============================================================================
// Repository
// ============================================================================

pub struct NftRepository {
    pool: SqlitePool,
}

impl NftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<NftWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, NftWithOwner>(
            "SELECT n.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address
             FROM nfts n
             JOIN users u ON n.owner_id = u.id
             WHERE n.owner_id = ?
             ORDER BY n.created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Marketplace view, optionally filtered by asset type
    pub async fn list_all(
        &self,
        asset_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NftWithOwner>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT n.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address
             FROM nfts n
             JOIN users u ON n.owner_id = u.id
             WHERE 1=1",
        );
        if let Some(asset_type) = asset_type {
            qb.push(" AND n.asset_type = ").push_bind(asset_type.to_string());
        }
        qb.push(" ORDER BY n.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<NftWithOwner>().fetch_all(&self.pool).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<NftWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, NftWithOwner>(
            "SELECT n.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address
             FROM nfts n
             JOIN users u ON n.owner_id = u.id
             WHERE n.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_for_project(
        &self,
        project_id: i64,
    ) -> Result<Option<NftWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, NftWithOwner>(
            "SELECT n.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address
             FROM nfts n
             JOIN users u ON n.owner_id = u.id
             WHERE n.project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<NftWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, NftWithOwner>(
            "SELECT n.*, u.username as owner_username,
                    u.wallet_address as owner_wallet_address
             FROM nfts n
             JOIN users u ON n.owner_id = u.id
             WHERE n.project_id = ?
             ORDER BY n.created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn exists_for_project(&self, project_id: i64) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM nfts WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Record a mint. `project_id` is the minted asset's id; for dataset
    /// and publication tokens it points at that asset rather than a
    /// project row.
    pub async fn record_mint(
        &self,
        project_id: i64,
        token: &MintedToken,
        metadata_json: &str,
        owner_id: i64,
        asset_type: &str,
    ) -> Result<NftWithOwner, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO nfts (
                project_id, token_id, contract_address, metadata_uri, owner_id, asset_type, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&token.token_id)
        .bind(&token.contract_address)
        .bind(metadata_json)
        .bind(owner_id)
        .bind(asset_type)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        self.find(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Replace the stored metadata JSON for a project's token
    pub async fn update_project_metadata(
        &self,
        project_id: i64,
        metadata_json: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE nfts SET metadata_uri = ? WHERE project_id = ?")
            .bind(metadata_json)
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Marketplace
    // ------------------------------------------------------------------

    pub async fn marketplace_for_project(
        &self,
        project_id: i64,
    ) -> Result<Vec<MarketplaceListing>, sqlx::Error> {
        sqlx::query_as::<_, MarketplaceListing>(
            "SELECT m.id, m.nft_id, m.seller_id, m.buyer_id, m.price, m.currency,
                    m.status, m.sale_date, m.created_at,
                    n.token_id, n.contract_address, n.metadata_uri,
                    u.username as seller_username,
                    u.wallet_address as seller_wallet_address,
                    p.name as project_name,
                    p.visibility as project_visibility
             FROM nft_marketplace m
             JOIN nfts n ON m.nft_id = n.id
             JOIN users u ON m.seller_id = u.id
             JOIN projects p ON n.project_id = p.id
             WHERE n.project_id = ? AND m.status = 'for_sale'
             ORDER BY m.price ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_listing(
        &self,
        nft_id: i64,
        seller_id: i64,
        price: f64,
        currency: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO nft_marketplace (nft_id, seller_id, price, currency, status)
             VALUES (?, ?, ?, ?, 'for_sale')",
        )
        .bind(nft_id)
        .bind(seller_id)
        .bind(price)
        .bind(currency)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn purchasable_listing(
        &self,
        marketplace_id: i64,
    ) -> Result<Option<PurchasableListing>, sqlx::Error> {
        sqlx::query_as::<_, PurchasableListing>(
            "SELECT m.id, m.nft_id, m.seller_id, m.price, m.currency,
                    u.username as seller_username
             FROM nft_marketplace m
             JOIN nfts n ON m.nft_id = n.id
             JOIN users u ON m.seller_id = u.id
             WHERE m.id = ? AND m.status = 'for_sale'",
        )
        .bind(marketplace_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Transfer ownership and close the listing atomically, the simulated
    /// equivalent of an on-chain sale.
    pub async fn purchase(
        &self,
        listing: &PurchasableListing,
        buyer_id: i64,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE nfts SET owner_id = ? WHERE id = ?")
            .bind(buyer_id)
            .bind(listing.nft_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE nft_marketplace SET status = 'sold', sale_date = ?, buyer_id = ? WHERE id = ?",
        )
        .bind(now_timestamp())
        .bind(buyer_id)
        .bind(listing.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainClient, MockChainClient};
    use crate::database::{migrations, project_repository::NewProject, ProjectRepository, UserRepository};

    async fn seeded() -> (SqlitePool, i64, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .await
            .unwrap();
        let projects = ProjectRepository::new(pool.clone());
        let project = projects
            .create(&NewProject {
                name: "mintable".into(),
                description: None,
                owner_id: user.id,
                visibility: "Private".into(),
                status: "Completed".into(),
                category: "Other".into(),
                start_date: crate::database::now_timestamp(),
            })
            .await
            .unwrap();
        (pool, user.id, project.id)
    }

    #[tokio::test]
    async fn mint_records_token_and_owner() {
        let (pool, owner_id, project_id) = seeded().await;
        let repo = NftRepository::new(pool);

        assert!(!repo.exists_for_project(project_id).await.unwrap());

        let token = MockChainClient.mint();
        let nft = repo
            .record_mint(project_id, &token, r#"{"title":"x"}"#, owner_id, "Project")
            .await
            .unwrap();

        assert_eq!(nft.nft.token_id.as_deref(), Some(token.token_id.as_str()));
        assert_eq!(nft.nft.asset_type, "Project");
        assert!(repo.exists_for_project(project_id).await.unwrap());
    }

    #[tokio::test]
    async fn purchase_transfers_ownership_and_closes_listing() {
        let (pool, seller_id, project_id) = seeded().await;
        let users = UserRepository::new(pool.clone());
        let (buyer, _) = users
            .login_or_create("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            .await
            .unwrap();
        let repo = NftRepository::new(pool);

        let token = MockChainClient.mint();
        let nft = repo
            .record_mint(project_id, &token, "{}", seller_id, "Project")
            .await
            .unwrap();
        let listing_id = repo
            .create_listing(nft.nft.id, seller_id, 1.5, "ETH")
            .await
            .unwrap();

        let listing = repo.purchasable_listing(listing_id).await.unwrap().unwrap();
        repo.purchase(&listing, buyer.id).await.unwrap();

        let nft = repo.find(nft.nft.id).await.unwrap().unwrap();
        assert_eq!(nft.nft.owner_id, buyer.id);

        // Sold listings are no longer purchasable
        assert!(repo.purchasable_listing(listing_id).await.unwrap().is_none());
        assert!(repo.marketplace_for_project(project_id).await.unwrap().is_empty());
    }
}
