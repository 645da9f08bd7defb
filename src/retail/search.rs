use super::{RetailClient, RetailError};
use crate::data_models::{SearchRequest, SearchResponse, SearchResult};

/// Lazily evaluated search.
///
/// Creating one does not contact the service; the aggregate response (facets,
/// total size, attribution token) stays empty until a page has been fetched.
pub struct SearchIterator {
    client: RetailClient,
    request: SearchRequest,
    response: Option<SearchResponse>,
    fetches: usize,
}

/// Results of a single remote call.
#[derive(Debug)]
pub struct FetchedPage {
    pub results: Vec<SearchResult>,
    pub next_page_token: String,
}

impl RetailClient {
    pub fn search(&self, request: SearchRequest) -> SearchIterator {
        SearchIterator {
            client: self.clone(),
            request,
            response: None,
            fetches: 0,
        }
    }
}

impl SearchIterator {
    /// Aggregate response of the most recent fetch, if any.
    pub fn response(&self) -> Option<&SearchResponse> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<SearchResponse> {
        self.response
    }

    /// Number of remote calls made so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Call the service once for `page_size` results starting at `page_token`.
    pub async fn fetch(
        &mut self,
        page_size: i32,
        page_token: &str,
    ) -> Result<FetchedPage, RetailError> {
        let mut request = self.request.clone();
        request.page_size = page_size;
        request.page_token = page_token.to_string();

        let url = self.client.url(&request.placement, Some("search"));
        log::debug!(
            "search placement={} page_size={} page_token={:?}",
            request.placement,
            page_size,
            page_token
        );
        let mut response: SearchResponse = self.client.post_json(url, &request).await?;
        self.fetches += 1;

        let page = FetchedPage {
            results: std::mem::take(&mut response.results),
            next_page_token: response.next_page_token.clone(),
        };
        self.response = Some(response);
        Ok(page)
    }
}
