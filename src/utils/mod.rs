pub mod id_gen;
pub mod toposort;

pub use id_gen::NameGenerator;
pub use toposort::toposort;

/// Asserts an iterator has exactly one item, consuming it. Used at the edges
/// where "exactly one matching X" is an invariant (e.g. a single
/// `@CompileAsUdf` per predicate).
pub trait IntoOnly<T> {
    fn into_only(self) -> anyhow::Result<T>;
}

impl<T, I: IntoIterator<Item = T>> IntoOnly<T> for I {
    fn into_only(self) -> anyhow::Result<T> {
        let mut iter = self.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| anyhow::anyhow!("expected exactly one item, got none"))?;
        if iter.next().is_some() {
            anyhow::bail!("expected exactly one item, got more than one");
        }
        Ok(first)
    }
}
