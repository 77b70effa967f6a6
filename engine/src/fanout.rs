use crate::common::lock;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    token: CancellationToken,
    callback: Callback<T>,
}

/// Same-process fan-out of values to registered callbacks.
///
/// Every registration is tethered to a [`CancellationToken`]; a cancelled
/// registration never fires again and is pruned on the next register or
/// emit, so the list never grows past the live registrations plus those
/// cancelled since the last call. This is the
/// channel behind the memory adapter's broadcast/watch pair and the signal
/// sources' change notifications.
pub struct Fanout<T> {
    entries: Arc<Mutex<Vec<Entry<T>>>>,
}

impl<T> Fanout<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers `callback` until `token` is cancelled.
    ///
    /// Registering with an already cancelled token is a no-op.
    pub fn register<F>(&self, token: CancellationToken, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut entries = lock(&self.entries);
        entries.retain(|entry| !entry.token.is_cancelled());
        if token.is_cancelled() {
            return;
        }
        entries.push(Entry {
            token,
            callback: Arc::new(callback),
        });
    }

    /// Delivers `value` to every live registration and returns how many fired.
    ///
    /// Callbacks run outside the internal lock, so they may register or emit.
    pub fn emit(&self, value: &T) -> usize {
        let live: Vec<(CancellationToken, Callback<T>)> = {
            let mut entries = lock(&self.entries);
            entries.retain(|entry| !entry.token.is_cancelled());
            entries
                .iter()
                .map(|entry| (entry.token.clone(), entry.callback.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (token, callback) in live {
            // An earlier callback may have cancelled this one.
            if token.is_cancelled() {
                continue;
            }
            callback(value);
            delivered += 1;
        }
        delivered
    }

    /// Number of registrations whose token is still live.
    pub fn listener_count(&self) -> usize {
        let mut entries = lock(&self.entries);
        entries.retain(|entry| !entry.token.is_cancelled());
        entries.len()
    }

    /// Registrations currently held, cancelled ones included.
    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        lock(&self.entries).len()
    }
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Fanout<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("listeners", &lock(&self.entries).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_live_registrations_only() {
        let fanout = Fanout::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let live = CancellationToken::new();
        let cancelled = CancellationToken::new();
        for token in [live.clone(), cancelled.clone()] {
            let hits = hits.clone();
            fanout.register(token, move |value| {
                hits.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }

        cancelled.cancel();
        assert_eq!(fanout.emit(&2), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(fanout.listener_count(), 1);
    }

    #[test]
    fn test_register_with_cancelled_token_is_ignored() {
        let fanout = Fanout::<()>::new();
        let token = CancellationToken::new();
        token.cancel();

        fanout.register(token, |_| panic!("must not fire"));
        assert_eq!(fanout.listener_count(), 0);
        assert_eq!(fanout.emit(&()), 0);
    }

    #[test]
    fn test_register_drops_cancelled_entries_without_emit() {
        let fanout = Fanout::<()>::new();
        for _ in 0..100 {
            let token = CancellationToken::new();
            fanout.register(token.clone(), |_| {});
            token.cancel();
        }

        assert_eq!(fanout.entry_count(), 1);
        fanout.register(CancellationToken::new(), |_| {});
        assert_eq!(fanout.entry_count(), 1);
    }

    #[test]
    fn test_child_tokens_are_cancelled_with_parent() {
        let fanout = Fanout::<()>::new();
        let parent = CancellationToken::new();
        fanout.register(parent.child_token(), |_| {});
        fanout.register(parent.child_token(), |_| {});
        assert_eq!(fanout.listener_count(), 2);

        parent.cancel();
        assert_eq!(fanout.listener_count(), 0);
    }
}
