// Query engine over any Collection: concurrent count+find pagination, per-operation
// deadlines and batched execution. Cache, retry and monitoring live in submodules.

pub mod cache;
pub mod monitor;
pub mod retry;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result, TransientKind};
use crate::models::{FindOptions, Page, PageOptions, SortKey};

pub use cache::{CacheStats, QueryCache};
pub use monitor::{MonitorStats, MonitoredQuery, QueryMonitor, monitor_query};
pub use retry::{RetryPolicy, find_with_retry, retry_transient};

/// A queryable set of records: the storage-side half of pagination.
///
/// `Filter` is the collection's native (typed) query language. Implementations validate
/// sort/select/populate fields and return `Error::InvalidArgument` for unknown ones.
pub trait Collection: Send + Sync {
    type Filter: Send + Sync;
    type Record: Send;

    /// Ordering applied when the caller does not ask for one.
    fn default_sort(&self) -> Vec<SortKey>;

    fn count(&self, filter: &Self::Filter) -> impl Future<Output = Result<u64>> + Send;

    fn find(
        &self,
        filter: &Self::Filter,
        options: &FindOptions,
    ) -> impl Future<Output = Result<Vec<Self::Record>>> + Send;
}

/// Runs `fut` under an optional time budget; an elapsed budget is a transient failure.
pub async fn with_deadline<T, F>(max_time: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match max_time {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Transient(TransientKind::Timeout(limit)))?,
        None => fut.await,
    }
}

/// One page of `collection` matching `filter`. Count and find are polled concurrently and
/// both must succeed; either failure fails the whole call.
pub async fn paginated_query<C: Collection>(
    collection: &C,
    filter: &C::Filter,
    options: &PageOptions,
) -> Result<Page<C::Record>> {
    if options.page == 0 {
        return Err(Error::invalid("page must be >= 1"));
    }
    if options.limit == 0 {
        return Err(Error::invalid("limit must be >= 1"));
    }
    let skip = (options.page - 1)
        .checked_mul(options.limit)
        .ok_or_else(|| Error::invalid("page * limit overflows"))?;

    let find_options = FindOptions {
        sort: options
            .sort
            .clone()
            .unwrap_or_else(|| collection.default_sort()),
        skip,
        limit: Some(options.limit),
        select: options.select.clone(),
        populate: options.populate.clone(),
        max_time: options.max_time,
    };

    let (total, data) = tokio::try_join!(
        with_deadline(options.max_time, collection.count(filter)),
        with_deadline(options.max_time, collection.find(filter, &find_options)),
    )?;

    Ok(Page::new(data, total, options.page, options.limit))
}

/// Runs independent queries concurrently; results keep input order. Fails on the first error.
pub async fn batch_queries<T, E, F, I>(queries: I) -> std::result::Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = std::result::Result<T, E>>,
{
    futures_util::future::try_join_all(queries).await
}
