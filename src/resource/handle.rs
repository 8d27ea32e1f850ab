//! Exposes the resource handle used to identify GPU resources in usage
//! declarations and state tracking.

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
struct ResourceInner {
    name: String,
    subresource_count: u32,
}

/// Cheap, clonable handle to a GPU resource. Identity is the allocation
/// address, so two handles compare equal exactly when they refer to the same
/// resource. Carries the number of addressable subresources (mip levels,
/// array slices, planes).
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    inner: Arc<ResourceInner>,
}

/// Stable identity of a resource, valid as long as at least one
/// [`ResourceHandle`] to it is alive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(usize);

/// Selects which subresources of a resource a usage or transition applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Subresources {
    /// Every subresource of the resource.
    All,
    /// A single subresource index in `[0, subresource_count)`.
    Index(u32),
}

impl ResourceHandle {
    /// Create a new resource handle. `subresource_count` must be at least one;
    /// resources without subresource structure (buffers) use a count of one.
    pub fn new(name: impl Into<String>, subresource_count: u32) -> Self {
        debug_assert!(subresource_count >= 1);
        ResourceHandle {
            inner: Arc::new(ResourceInner {
                name: name.into(),
                subresource_count: subresource_count.max(1),
            }),
        }
    }

    /// Get the identity of this resource.
    pub fn id(&self) -> ResourceId {
        ResourceId(Arc::as_ptr(&self.inner) as usize)
    }

    /// Get the debug name of this resource.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Get the number of addressable subresources.
    pub fn subresource_count(&self) -> u32 {
        self.inner.subresource_count
    }

    /// Iterate the concrete subresource indices selected by `subresources`.
    pub fn subresource_indices(
        &self,
        subresources: Subresources,
    ) -> impl Iterator<Item = u32> + '_ {
        let (start, end) = match subresources {
            Subresources::All => (0, self.subresource_count()),
            Subresources::Index(i) => (i, i + 1),
        };
        start..end
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ResourceHandle {}

impl Hash for ResourceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Subresources {
    /// Whether two selectors on the same resource address at least one common
    /// subresource index.
    pub fn overlaps(&self, other: &Subresources) -> bool {
        match (self, other) {
            (Subresources::All, _) | (_, Subresources::All) => true,
            (Subresources::Index(a), Subresources::Index(b)) => a == b,
        }
    }
}
