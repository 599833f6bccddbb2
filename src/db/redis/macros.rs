/// Read-through caching on top of [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, hands the result to
/// the background writer and returns it. A failed cache read is logged and treated as a
/// miss, so Redis being down only costs a recompute.
///
/// # Arguments
/// * `$cache`: The cache instance; must have `get_from_cache` and `set_in_background`.
/// * `$key`: The [`CacheKey`](crate::db::CacheKey) to read and write.
/// * `$ttl`: The time-to-live (TTL) for the cached value in seconds.
/// * `$block`: A future computing the value on a miss, resolving to a `Result`.
///
/// # Example
/// ```rust,ignore
/// let items: Vec<ScoredItem> = cached!(cache, key, 3600, async move {
///     AppResult::Ok(compute_similar_items())
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => {
                tracing::debug!(key = %$key, "Cache hit");
                Ok(cached)
            }
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(error = %e, key = %$key, "Cache read failed, recomputing");
                } else {
                    tracing::debug!(key = %$key, "Cache miss");
                }
                match $block.await {
                    Ok(value) => {
                        $cache.set_in_background(&$key, &value, $ttl);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }};
}
