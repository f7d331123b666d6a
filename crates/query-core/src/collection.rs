//! Logical identity of a base collection

use std::borrow::Cow;
use std::sync::Arc;

/// A base collection that can be named independently of where it lives in memory.
///
/// Two handles onto the same logical collection (e.g. the same table) must
/// report the same identifier even if they are distinct objects.
pub trait CollectionIdentity {
    fn collection_id(&self) -> Cow<'_, str>;
}

impl CollectionIdentity for str {
    fn collection_id(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl CollectionIdentity for String {
    fn collection_id(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl<T: CollectionIdentity + ?Sized> CollectionIdentity for &T {
    fn collection_id(&self) -> Cow<'_, str> {
        (**self).collection_id()
    }
}

impl<T: CollectionIdentity + ?Sized> CollectionIdentity for Arc<T> {
    fn collection_id(&self) -> Cow<'_, str> {
        (**self).collection_id()
    }
}
