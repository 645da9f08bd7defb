use serde_json::Value;

use super::{RetailClient, RetailError};
use crate::data_models::snake_case_keys;

impl RetailClient {
    /// Fetch a product by its fully-qualified name
    /// (`projects/*/locations/*/catalogs/*/branches/*/products/*`).
    ///
    /// Field names come back in snake_case, matching the products embedded in
    /// search results.
    pub async fn get_product(&self, name: &str) -> Result<Value, RetailError> {
        let url = self.url(name, None);
        let product: Value = self.get_json(url, &[]).await?;
        Ok(snake_case_keys(product))
    }
}
