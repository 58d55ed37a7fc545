//! `PostgREST` client for the hosted row store.

use async_trait::async_trait;
use aurora_core::{LineKey, UserId, WishlistEntryId};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::{
    CartRow, CartStore, NewCartRow, NewOrder, NewProfile, NewWishlistRow, Order, OrderStore,
    Profile, ProfileStore, ProfileUpdate, StoreError, WishlistRow, WishlistStore,
};
use crate::config::SupabaseConfig;

const REST_PATH: &str = "rest/v1/";

/// HTTP client for the `/rest/v1` tables.
#[derive(Clone)]
pub struct PostgrestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PostgrestClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, StoreError> {
        let key = config.anon_key.expose_secret();
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| StoreError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| StoreError::Parse(format!("Invalid API key format: {e}")))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let base_url = config
            .url
            .join(REST_PATH)
            .map_err(|e| StoreError::Parse(format!("Invalid base URL: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// URL of a table with `column=eq.value` filters and optional ordering.
    fn table_url(
        &self,
        table: &str,
        filters: &[(&str, String)],
        order: Option<&str>,
    ) -> Result<Url, StoreError> {
        let mut url = self
            .base_url
            .join(table)
            .map_err(|e| StoreError::Parse(format!("Invalid table URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in filters {
                pairs.append_pair(column, &format!("eq.{value}"));
            }
            if let Some(order) = order {
                pairs.append_pair("order", order);
            }
        }
        Ok(url)
    }

    async fn select<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, StoreError> {
        let response = self.client.get(url).send().await?;
        parse_rows(error_for_status(response).await?).await
    }

    /// POST a row and return the stored representation.
    async fn insert_one<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let url = self.table_url(table, &[], None)?;
        let response = self
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        first_row(table, parse_rows(error_for_status(response).await?).await?)
    }

    /// PATCH rows matching `url` and return their new representation.
    async fn patch<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        parse_rows(error_for_status(response).await?).await
    }

    async fn delete_where(&self, url: Url) -> Result<(), StoreError> {
        let response = self.client.delete(url).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

fn key_filters(user_id: &UserId, key: &LineKey) -> [(&'static str, String); 4] {
    [
        ("user_id", user_id.to_string()),
        ("product_id", key.product_id.to_string()),
        ("size", key.size.clone()),
        ("color", key.color.clone()),
    ]
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_rows<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Vec<T>, StoreError> {
    response
        .json()
        .await
        .map_err(|e| StoreError::Parse(e.to_string()))
}

fn first_row<T>(table: &str, rows: Vec<T>) -> Result<T, StoreError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::Parse(format!("{table}: empty representation")))
}

#[async_trait]
impl CartStore for PostgrestClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list(&self, user_id: &UserId) -> Result<Vec<CartRow>, StoreError> {
        let url = self.table_url(
            "cart_items",
            &[("user_id", user_id.to_string())],
            Some("id.asc"),
        )?;
        self.select(url).await
    }

    #[instrument(skip(self, row), fields(user_id = %row.user_id, product_id = %row.product_id))]
    async fn insert(&self, row: &NewCartRow) -> Result<CartRow, StoreError> {
        self.insert_one("cart_items", row).await
    }

    #[instrument(skip(self, key), fields(user_id = %user_id, product_id = %key.product_id))]
    async fn update_quantity(
        &self,
        user_id: &UserId,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let url = self.table_url("cart_items", &key_filters(user_id, key), None)?;
        let rows: Vec<CartRow> = self
            .patch(url, &serde_json::json!({ "quantity": quantity }))
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(format!(
                "cart row for product {}",
                key.product_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, key), fields(user_id = %user_id, product_id = %key.product_id))]
    async fn delete(&self, user_id: &UserId, key: &LineKey) -> Result<(), StoreError> {
        let url = self.table_url("cart_items", &key_filters(user_id, key), None)?;
        self.delete_where(url).await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn clear(&self, user_id: &UserId) -> Result<(), StoreError> {
        let url = self.table_url("cart_items", &[("user_id", user_id.to_string())], None)?;
        self.delete_where(url).await
    }
}

#[async_trait]
impl WishlistStore for PostgrestClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list(&self, user_id: &UserId) -> Result<Vec<WishlistRow>, StoreError> {
        let url = self.table_url(
            "wishlist",
            &[("user_id", user_id.to_string())],
            Some("id.asc"),
        )?;
        self.select(url).await
    }

    #[instrument(skip(self, row), fields(user_id = %row.user_id, product_id = %row.product_id))]
    async fn insert(&self, row: &NewWishlistRow) -> Result<WishlistRow, StoreError> {
        self.insert_one("wishlist", row).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: WishlistEntryId) -> Result<(), StoreError> {
        let url = self.table_url("wishlist", &[("id", id.to_string())], None)?;
        self.delete_where(url).await
    }

    #[instrument(skip(self))]
    async fn set_notify(
        &self,
        id: WishlistEntryId,
        notify: bool,
    ) -> Result<WishlistRow, StoreError> {
        let url = self.table_url("wishlist", &[("id", id.to_string())], None)?;
        let rows = self
            .patch(url, &serde_json::json!({ "notify_on_restock": notify }))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("wishlist entry {id}")))
    }
}

#[async_trait]
impl ProfileStore for PostgrestClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get(&self, user_id: &UserId) -> Result<Option<Profile>, StoreError> {
        let url = self.table_url("profiles", &[("id", user_id.to_string())], None)?;
        let rows: Vec<Profile> = self.select(url).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn create(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        self.insert_one("profiles", profile).await
    }

    #[instrument(skip(self, update), fields(user_id = %user_id))]
    async fn update(
        &self,
        user_id: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        let url = self.table_url("profiles", &[("id", user_id.to_string())], None)?;
        let rows = self.patch(url, update).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("profile {user_id}")))
    }
}

#[async_trait]
impl OrderStore for PostgrestClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        let url = self.table_url(
            "orders",
            &[("user_id", user_id.to_string())],
            Some("created_at.desc"),
        )?;
        self.select(url).await
    }

    #[instrument(skip(self, order), fields(user_id = %order.user_id))]
    async fn insert(&self, order: &NewOrder) -> Result<Order, StoreError> {
        self.insert_one("orders", order).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aurora_core::ProductId;
    use secrecy::SecretString;

    use super::*;

    fn client() -> PostgrestClient {
        PostgrestClient::new(&SupabaseConfig {
            url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("anon-key-123"),
        })
        .unwrap()
    }

    #[test]
    fn test_table_url_with_filters() {
        let client = client();
        let url = client
            .table_url("cart_items", &[("user_id", "uid-1".to_string())], Some("id.asc"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/rest/v1/cart_items?user_id=eq.uid-1&order=id.asc"
        );
    }

    #[test]
    fn test_key_filters_address_row_by_identity() {
        let client = client();
        let key = LineKey::new(ProductId::new(4), "XL", "dark blue");
        let url = client
            .table_url("cart_items", &key_filters(&UserId::new("u"), &key), None)
            .unwrap();
        assert_eq!(
            url.query(),
            Some("user_id=eq.u&product_id=eq.4&size=eq.XL&color=eq.dark+blue")
        );
    }

    #[test]
    fn test_debug_hides_headers() {
        let debug_output = format!("{:?}", client());
        assert!(debug_output.contains("abc.supabase.co"));
        assert!(!debug_output.contains("anon-key-123"));
    }
}
