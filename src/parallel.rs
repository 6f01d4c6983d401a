//! Thin wrappers around rayon with serial fallbacks.
//!
//! The `rayon` cargo feature is on by default; disabling it keeps the same
//! API but runs everything on the calling thread.

/// Sort a slice by key in parallel when rayon is enabled.
pub fn sort_unstable_by_key<T, K, F>(data: &mut [T], key: F)
where
    T: Send,
    K: Ord,
    F: Fn(&T) -> K + Sync,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        data.par_sort_unstable_by_key(key);
    }
    #[cfg(not(feature = "rayon"))]
    data.sort_unstable_by_key(key);
}

/// Run `f` over every item, in parallel when rayon is enabled.
pub fn for_each<T, F>(items: Vec<T>, f: F)
where
    T: Send,
    F: Fn(T) + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        items.into_par_iter().for_each(f);
    }
    #[cfg(not(feature = "rayon"))]
    items.into_iter().for_each(f);
}
