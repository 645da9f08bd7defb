use crate::data_models::{SearchRequest, SearchResponse, SearchResult};
use crate::retail::{RetailClient, RetailError, SearchIterator};

/// Pulls fixed-size pages out of a [`SearchIterator`].
///
/// A page may span several remote calls when the service returns fewer
/// results than asked for while still handing out a continuation token.
pub struct Pager<'a> {
    iter: &'a mut SearchIterator,
    page_size: usize,
    page_token: String,
}

impl<'a> Pager<'a> {
    pub fn new(iter: &'a mut SearchIterator, page_size: i32, page_token: impl Into<String>) -> Self {
        Self {
            iter,
            page_size: page_size.max(0) as usize,
            page_token: page_token.into(),
        }
    }

    /// Token for the page after the last one returned; empty once exhausted.
    pub fn next_page_token(&self) -> &str {
        &self.page_token
    }

    /// Fetch up to `page_size` results starting at the current token.
    ///
    /// Always makes at least one remote call so the iterator's aggregate
    /// response gets populated, even for a zero page size. A zero-size page
    /// consumes nothing, so the token stays where it was.
    pub async fn next_page(&mut self) -> Result<Vec<SearchResult>, RetailError> {
        // page_size is caller input; never size the buffer from it
        let mut buffered: Vec<SearchResult> = Vec::new();
        let mut token = self.page_token.clone();

        loop {
            let remaining = self.page_size - buffered.len();
            let page = self
                .iter
                .fetch(i32::try_from(remaining).unwrap_or(i32::MAX), &token)
                .await?;
            let fetched = page.results.len();
            buffered.extend(page.results);
            token = page.next_page_token;

            if buffered.len() >= self.page_size || token.is_empty() || fetched == 0 {
                break;
            }
        }

        buffered.truncate(self.page_size);
        if self.page_size > 0 {
            self.page_token = token;
        }
        Ok(buffered)
    }
}

/// Run `request` and return exactly one page of it as the aggregate response.
///
/// The aggregate comes from the last remote call (facets, total size,
/// attribution token) with its results replaced by the assembled page.
pub async fn search_page(
    client: &RetailClient,
    request: SearchRequest,
) -> Result<SearchResponse, RetailError> {
    let page_size = request.page_size;
    let page_token = request.page_token.clone();

    let mut iter = client.search(request);
    let mut pager = Pager::new(&mut iter, page_size, page_token);
    let results = pager.next_page().await?;
    let next_page_token = pager.next_page_token().to_string();

    let mut response = iter.into_response().unwrap_or_default();
    response.results = results;
    response.next_page_token = next_page_token;
    Ok(response)
}
