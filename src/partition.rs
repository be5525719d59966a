use std::num::NonZeroUsize;

/// Split `items` into `n` contiguous chunks whose sizes differ by at most one.
///
/// The first `len % n` chunks carry the extra element. With fewer items than
/// chunks the trailing chunks are empty.
pub fn split_even<T>(items: Vec<T>, n: NonZeroUsize) -> Vec<Vec<T>> {
    let n = n.get();
    let base = items.len() / n;
    let extra = items.len() % n;

    let mut iter = items.into_iter();
    (0..n)
        .map(|i| {
            let size = base + usize::from(i < extra);
            iter.by_ref().take(size).collect()
        })
        .collect()
}
