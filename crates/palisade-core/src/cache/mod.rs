//! Response caching with TTL expiry, LRU eviction, and single-flight reads.

pub mod response_cache;
