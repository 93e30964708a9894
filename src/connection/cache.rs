//! Per-scope staging buffers for data accumulated before it is sent.

use bytes::{Bytes, BytesMut};

/// Visibility scope of staged data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Visible only to processes on the same node.
    Local,
    /// Visible only to processes on other nodes.
    Remote,
    /// Visible to every process in the job.
    Global,
}

#[derive(Debug, Default)]
pub(crate) struct StagingCache {
    local: BytesMut,
    remote: BytesMut,
    global: BytesMut,
}

impl StagingCache {
    fn buffer(&mut self, scope: Scope) -> &mut BytesMut {
        match scope {
            Scope::Local => &mut self.local,
            Scope::Remote => &mut self.remote,
            Scope::Global => &mut self.global,
        }
    }

    pub(crate) fn stage(&mut self, scope: Scope, data: &[u8]) {
        self.buffer(scope).extend_from_slice(data);
    }

    /// Remove and return everything staged under `scope`.
    pub(crate) fn take(&mut self, scope: Scope) -> Bytes { self.buffer(scope).split().freeze() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_independent_and_take_empties() {
        let mut cache = StagingCache::default();
        cache.stage(Scope::Local, b"a=1;");
        cache.stage(Scope::Local, b"b=2;");
        cache.stage(Scope::Global, b"g");

        assert_eq!(cache.take(Scope::Local).as_ref(), b"a=1;b=2;");
        assert!(cache.take(Scope::Local).is_empty());
        assert!(cache.take(Scope::Remote).is_empty());
        assert_eq!(cache.take(Scope::Global).as_ref(), b"g");
    }
}
