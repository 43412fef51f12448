//! Rate-limited draining of cursor-based provider listings.
//!
//! The first page is always fetched. After every page, including the last one, the
//! paginator sleeps the fixed delay before it looks at the next cursor; the provider's
//! per-second budget matters here, not wall-clock time. Any error aborts the whole
//! listing: there is no partial result.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info};
use tunepool_common::{Cursor, Page};

use crate::provider::ProviderError;
use crate::telemetry::Telemetry;

#[derive(Clone)]
pub struct Paginator {
    delay: Duration,
    telemetry: Arc<dyn Telemetry>,
}

impl Paginator {
    pub fn new(delay: Duration, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { delay, telemetry }
    }

    /// Fetch every page of a listing and concatenate the items in page order.
    ///
    /// `fetch` receives `None` for the first page and the previous page's cursor after that.
    pub async fn collect<T, F, Fut>(&self, listing: &str, user_id: &str, mut fetch: F) -> Result<Vec<T>, ProviderError>
    where
        F: FnMut(Option<Cursor>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ProviderError>>,
    {
        let mut page = fetch(None).await.inspect_err(|e| {
            error!(listing, user_id, error = %e, "failed to fetch first page");
        })?;

        if let Some(total) = page.total {
            info!(listing, user_id, total, "listing reports total items");
        }

        let mut items = Vec::new();
        let mut page_number = 1;

        loop {
            let Page { items: batch, next, .. } = page;
            debug!(listing, user_id, page = page_number, items = batch.len(), "page fetched");
            self.telemetry.page_fetched(listing, user_id, page_number, batch.len());
            items.extend(batch);

            sleep(self.delay).await;

            let Some(cursor) = next else {
                break;
            };
            page_number += 1;
            page = fetch(Some(cursor)).await.inspect_err(|e| {
                error!(listing, user_id, page = page_number, error = %e, "failed to fetch page");
            })?;
        }

        info!(listing, user_id, pages = page_number, items = items.len(), "listing drained");
        Ok(items)
    }
}
