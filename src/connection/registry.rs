//! Reply tag allocation and the tag to callback map.
//!
//! Tags are allocated by client handles so `enqueue` can return the tag
//! synchronously; the callbacks themselves live only on the reactor.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{ClientError, frame::Tag, hooks::ReplyCallback, panic::contain};

/// Set of reply tags currently held by outstanding requests.
#[derive(Debug)]
pub(crate) struct TagSpace {
    next: u32,
    limit: u32,
    outstanding: HashSet<Tag>,
}

impl Default for TagSpace {
    fn default() -> Self { Self::with_limit(u32::MAX) }
}

impl TagSpace {
    /// Allocate tags from `1..=limit`.
    pub(crate) fn with_limit(limit: u32) -> Self {
        Self {
            next: 0,
            limit: limit.max(1),
            outstanding: HashSet::new(),
        }
    }

    /// Reserve the next free tag, skipping 0 and outstanding tags.
    ///
    /// Returns `None` when every tag is outstanding.
    pub(crate) fn allocate(&mut self) -> Option<Tag> {
        let capacity = usize::try_from(self.limit).unwrap_or(usize::MAX);
        if self.outstanding.len() >= capacity {
            return None;
        }
        loop {
            self.next = if self.next >= self.limit { 1 } else { self.next + 1 };
            let tag = Tag::new(self.next);
            if self.outstanding.insert(tag) {
                return Some(tag);
            }
        }
    }

    pub(crate) fn release(&mut self, tag: Tag) -> bool { self.outstanding.remove(&tag) }

    #[cfg(test)]
    pub(crate) fn is_outstanding(&self, tag: Tag) -> bool { self.outstanding.contains(&tag) }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize { self.outstanding.len() }
}

/// Tag space shared between client handles and the reactor.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedTags(Arc<Mutex<TagSpace>>);

impl SharedTags {
    #[cfg(test)]
    pub(crate) fn with_limit(limit: u32) -> Self {
        Self(Arc::new(Mutex::new(TagSpace::with_limit(limit))))
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut TagSpace) -> R) -> R {
        let mut space = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut space)
    }

    pub(crate) fn allocate(&self) -> Option<Tag> { self.with(TagSpace::allocate) }

    pub(crate) fn release(&self, tag: Tag) -> bool { self.with(|space| space.release(tag)) }
}

/// Reply callbacks keyed by the tag their request was sent with.
pub(crate) struct TagRegistry {
    tags: SharedTags,
    entries: HashMap<Tag, ReplyCallback>,
}

impl TagRegistry {
    pub(crate) fn new(tags: SharedTags) -> Self {
        Self {
            tags,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, tag: Tag, callback: ReplyCallback) {
        if let Some(previous) = self.entries.insert(tag, callback) {
            log::error!("reply tag {tag} registered twice; cancelling the earlier request");
            contain("reply callback", move || previous(Err(ClientError::Cancelled)));
        }
    }

    /// Deliver `payload` to the request registered under `tag`.
    ///
    /// The tag is released before the callback runs. Returns `false` when no
    /// request is waiting on `tag`.
    pub(crate) fn complete(&mut self, tag: Tag, payload: &[u8]) -> bool {
        let Some(callback) = self.entries.remove(&tag) else {
            return false;
        };
        self.tags.release(tag);
        contain("reply callback", move || callback(Ok(payload)));
        true
    }

    /// Fail every registered request with `err`, in tag order.
    pub(crate) fn drain(&mut self, err: &ClientError) -> usize {
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_unstable_by_key(|(tag, _)| *tag);
        let count = entries.len();
        for (tag, callback) in entries {
            self.tags.release(tag);
            let err = err.clone();
            contain("reply callback", move || callback(Err(err)));
        }
        count
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn allocation_skips_zero_and_wraps() {
        let mut space = TagSpace::with_limit(3);
        let tags: Vec<_> = (0..3).filter_map(|_| space.allocate()).collect();
        assert_eq!(tags, [Tag::new(1), Tag::new(2), Tag::new(3)]);
        assert_eq!(space.allocate(), None);

        assert!(space.release(Tag::new(2)));
        assert_eq!(space.allocate(), Some(Tag::new(2)));
    }

    #[test]
    fn outstanding_tags_are_never_reissued() {
        let mut space = TagSpace::with_limit(4);
        let held = space.allocate().expect("first tag");
        for _ in 0..32 {
            let tag = space.allocate().expect("free tag");
            assert_ne!(tag, held);
            assert_ne!(tag, Tag::NONE);
            space.release(tag);
        }
        assert!(space.is_outstanding(held));
        assert_eq!(space.outstanding(), 1);
    }

    #[test]
    fn complete_removes_entry_and_releases_tag() {
        let tags = SharedTags::with_limit(8);
        let mut registry = TagRegistry::new(tags.clone());
        let tag = tags.allocate().expect("tag");
        let (tx, rx) = mpsc::channel();
        registry.register(
            tag,
            Box::new(move |reply: Result<&[u8], ClientError>| {
                tx.send(reply.map(<[u8]>::to_vec)).expect("receiver alive");
            }),
        );

        assert!(registry.complete(tag, b"v=1"));
        assert_eq!(rx.recv().expect("callback ran").expect("reply"), b"v=1");
        assert!(registry.is_empty());
        assert!(!tags.with(|space| space.is_outstanding(tag)));
        assert!(!registry.complete(tag, b"again"));
    }

    #[test]
    fn drain_invokes_each_callback_once() {
        let tags = SharedTags::with_limit(8);
        let mut registry = TagRegistry::new(tags.clone());
        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            let tag = tags.allocate().expect("tag");
            let tx = tx.clone();
            registry.register(
                tag,
                Box::new(move |reply: Result<&[u8], ClientError>| {
                    tx.send((tag, reply.is_err())).expect("receiver alive");
                }),
            );
        }
        drop(tx);

        assert_eq!(registry.drain(&ClientError::Cancelled), 3);
        assert_eq!(registry.drain(&ClientError::Cancelled), 0);
        let seen: Vec<_> = rx.iter().collect();
        assert_eq!(
            seen,
            [(Tag::new(1), true), (Tag::new(2), true), (Tag::new(3), true)]
        );
        assert_eq!(tags.with(|space| space.outstanding()), 0);
    }
}
