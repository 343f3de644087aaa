/// Switch between rayon and plain iteration.
///
/// Two hot loops run through `into_par_iter`: the per-row D8 sweep in
/// `flow::direction` and the per-exponent steps of
/// `chi::collinearity::sweep_concavity`. With the `parallel` feature this
/// module is rayon's prelude; without it, a one-trait shim routes the same
/// calls to `into_iter()` so both loops compile sequentially.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    /// Sequential `IntoParallelIterator`. Only `into_par_iter` is needed;
    /// the rest of each chain (`map`, `flat_map`, `collect`) resolves to
    /// the standard `Iterator` methods on the returned iterator.
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
