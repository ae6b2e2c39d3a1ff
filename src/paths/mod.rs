/**
 * Paths Module
 *
 * Cache volume layout and directory helpers. Every path the job writes to
 * is derived from the `CacheConfig` built for that invocation.
 */
mod cache_dirs;

pub use cache_dirs::*;
