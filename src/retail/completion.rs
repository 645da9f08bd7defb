use super::{RetailClient, RetailError};
use crate::data_models::{CompleteQueryResponse, CompletionRequest};

impl RetailClient {
    pub async fn complete_query(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompleteQueryResponse, RetailError> {
        let url = self.url(&request.catalog, Some("completeQuery"));
        self.get_json(url, &request.query_params()).await
    }
}
