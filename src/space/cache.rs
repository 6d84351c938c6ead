//! Single-key caches tied to the mesh sequence a space was built for.

use once_cell::unsync::OnceCell;

use crate::dof_error::DofSieveError;

/// Anything that caches data derived from the mesh topology should implement this.
pub trait InvalidateCache {
    /// Drop all cached data so the next query recomputes it.
    fn invalidate_cache(&mut self);
}

impl<T: InvalidateCache + ?Sized> InvalidateCache for Box<T> {
    #[inline]
    fn invalidate_cache(&mut self) {
        (**self).invalidate_cache();
    }
}

/// A lazily computed value stamped with the version it was computed for.
///
/// Reads go through `&self`; the value is computed at most once per version.
/// Replacing it requires `&mut self` ([`InvalidateCache::invalidate_cache`]),
/// which is why a stale stamp on read is reported rather than recomputed.
#[derive(Debug)]
pub struct VersionedCache<T> {
    cell: OnceCell<(u64, T)>,
}

impl<T> Default for VersionedCache<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T> VersionedCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The cached value if it was built for `version`.
    pub fn get(&self, version: u64) -> Option<&T> {
        self.cell
            .get()
            .and_then(|(v, t)| (*v == version).then_some(t))
    }

    /// The cached value for `version`, computing it with `build` on first use.
    pub fn get_or_try_init(
        &self,
        version: u64,
        build: impl FnOnce() -> Result<T, DofSieveError>,
    ) -> Result<&T, DofSieveError> {
        let (v, t) = self.cell.get_or_try_init(|| build().map(|t| (version, t)))?;
        if *v != version {
            return Err(DofSieveError::StaleSpace {
                space: *v,
                mesh: version,
            });
        }
        Ok(t)
    }
}

impl<T> InvalidateCache for VersionedCache<T> {
    fn invalidate_cache(&mut self) {
        self.cell.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_once_per_version() {
        let mut c = VersionedCache::new();
        let mut calls = 0;
        assert_eq!(*c.get_or_try_init(3, || { calls += 1; Ok(7) }).unwrap(), 7);
        assert_eq!(*c.get_or_try_init(3, || Ok(8)).unwrap(), 7);
        assert_eq!(calls, 1);
        assert!(matches!(
            c.get_or_try_init(4, || Ok(9)),
            Err(DofSieveError::StaleSpace { space: 3, mesh: 4 })
        ));
        c.invalidate_cache();
        assert!(c.get(3).is_none());
        assert_eq!(*c.get_or_try_init(4, || Ok(9)).unwrap(), 9);
    }

    #[test]
    fn failed_build_leaves_cache_empty() {
        let c: VersionedCache<u32> = VersionedCache::new();
        assert!(c.get_or_try_init(0, || Err(DofSieveError::Unsupported("x"))).is_err());
        assert!(!c.is_built());
    }
}
