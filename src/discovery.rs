//! Picking a source from the live discovery set.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use log::{debug, info};

use crate::{transport::Source, Result};

/// A continuously updated set of visible sources.
pub trait SourceSet {
    /// Blocks until the set changes or `timeout` elapses. Returns `true` on change.
    fn wait_for_change(&self, timeout: Duration) -> bool;

    /// Snapshot of the sources currently visible.
    fn current(&self) -> Result<Vec<Source>>;
}

/// Reacts to the first change of the discovery set by choosing one source.
///
/// The first source of the set wins; later notifications are ignored. A
/// notification that arrives while the set is empty does not count, so the
/// listener keeps waiting for one that carries a source.
#[derive(Debug, Default)]
pub struct DiscoveryListener {
    selected: AtomicBool,
}

impl DiscoveryListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the source to connect to, at most once over the listener's life.
    pub fn on_change(&self, sources: &[Source]) -> Option<Source> {
        let first = sources.first()?;
        if self.selected.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(first.clone())
    }

    /// Whether a source has already been chosen.
    pub fn has_selected(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }
}

/// Waits on `set` until `listener` selects a source or `cancel` is raised.
///
/// `poll_interval` bounds each wait, and so how long a cancellation takes to be
/// noticed. Returns `Ok(None)` when cancelled.
pub fn watch<S: SourceSet + ?Sized>(
    set: &S,
    listener: &DiscoveryListener,
    cancel: &AtomicBool,
    poll_interval: Duration,
) -> Result<Option<Source>> {
    info!("Waiting for sources...");

    while !cancel.load(Ordering::Acquire) {
        if !set.wait_for_change(poll_interval) {
            continue;
        }

        let sources = set.current()?;
        debug!("Discovery set changed: {} source(s)", sources.len());

        if let Some(source) = listener.on_change(&sources) {
            return Ok(Some(source));
        }
        if listener.has_selected() {
            // Someone else already picked a source for this listener.
            return Ok(None);
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    /// Replays a scripted list of discovery snapshots, one per change.
    struct ScriptedSet {
        batches: Mutex<VecDeque<Vec<Source>>>,
        current: Mutex<Vec<Source>>,
        snapshots: Mutex<usize>,
    }

    impl ScriptedSet {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            Self {
                batches: Mutex::new(
                    batches
                        .into_iter()
                        .map(|b| b.into_iter().map(Source::new).collect())
                        .collect(),
                ),
                current: Mutex::new(Vec::new()),
                snapshots: Mutex::new(0),
            }
        }
    }

    impl SourceSet for ScriptedSet {
        fn wait_for_change(&self, _timeout: Duration) -> bool {
            match self.batches.lock().unwrap().pop_front() {
                Some(batch) => {
                    *self.current.lock().unwrap() = batch;
                    true
                }
                None => false,
            }
        }

        fn current(&self) -> Result<Vec<Source>> {
            *self.snapshots.lock().unwrap() += 1;
            Ok(self.current.lock().unwrap().clone())
        }
    }

    #[test]
    fn first_source_of_batch_is_selected() {
        let listener = DiscoveryListener::new();
        let chosen = listener.on_change(&[Source::new("A"), Source::new("B")]);
        assert_eq!(chosen, Some(Source::new("A")));
    }

    #[test]
    fn only_one_selection_across_rapid_notifications() {
        let listener = DiscoveryListener::new();
        let batch = [Source::new("A"), Source::new("B")];

        let selections: Vec<_> = (0..10).filter_map(|_| listener.on_change(&batch)).collect();

        assert_eq!(selections, vec![Source::new("A")]);
        assert!(listener.has_selected());
    }

    #[test]
    fn empty_notification_keeps_waiting() {
        let listener = DiscoveryListener::new();
        assert_eq!(listener.on_change(&[]), None);
        assert!(!listener.has_selected());
        assert_eq!(
            listener.on_change(&[Source::new("late")]),
            Some(Source::new("late"))
        );
    }

    #[test]
    fn concurrent_notifications_select_once() {
        use std::{sync::Arc, thread};

        let listener = Arc::new(DiscoveryListener::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let listener = Arc::clone(&listener);
                thread::spawn(move || listener.on_change(&[Source::new(format!("S{i}"))]))
            })
            .collect();

        let selected = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(selected, 1);
    }

    #[test]
    fn watch_skips_empty_batches_and_returns_first() {
        let set = ScriptedSet::new(vec![vec![], vec!["A", "B"], vec!["C"]]);
        let listener = DiscoveryListener::new();
        let cancel = AtomicBool::new(false);

        let chosen = watch(&set, &listener, &cancel, Duration::from_millis(1)).unwrap();

        assert_eq!(chosen, Some(Source::new("A")));
        assert_eq!(*set.snapshots.lock().unwrap(), 2);
        assert_eq!(set.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn watch_returns_none_when_cancelled() {
        let set = ScriptedSet::new(vec![]);
        let listener = DiscoveryListener::new();
        let cancel = AtomicBool::new(true);

        let chosen = watch(&set, &listener, &cancel, Duration::from_millis(1)).unwrap();
        assert_eq!(chosen, None);
        assert!(!listener.has_selected());
    }
}
