//! Ordered track queue with a current-index cursor and playback modes.
//!
//! This is plain data: no locking and no transport side effects here. The
//! player owns a `Queue` behind its mutex and is responsible for stopping
//! playback when a mutation dislodges the current track.

use rand::Rng;

use crate::services::catalog::TrackRef;

pub struct Queue {
    tracks: Vec<TrackRef>,
    cur: Option<usize>,
    repeat: bool,
    shuffle: bool,
    /// Permutation of `[0, len)` when shuffling; logical advance steps walk
    /// this order instead of the queue order.
    order: Vec<usize>,
    order_pos: usize,
}

/// What a removal did to the cursor.
#[derive(Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Cursor untouched or shifted; playback may continue.
    Kept,
    /// The current track was removed; the caller must stop playback.
    RemovedCurrent,
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            tracks: Vec::new(),
            cur: None,
            repeat: false,
            shuffle: false,
            order: Vec::new(),
            order_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cur
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn track_at(&self, index: usize) -> Option<&TrackRef> {
        self.tracks.get(index)
    }

    pub fn current_track(&self) -> Option<&TrackRef> {
        self.cur.and_then(|i| self.tracks.get(i))
    }

    /// Copy of the track list, each entry holding its own reference.
    pub fn tracks(&self) -> Vec<TrackRef> {
        self.tracks.clone()
    }

    /// Append a track, refusing handles that are not loaded or not
    /// available, as the catalog forbids loading those later.
    pub fn append(&mut self, track: TrackRef) -> bool {
        if !track.is_loaded() {
            tracing::debug!("refusing unloaded track {}", track.uri());
            return false;
        }
        if !track.is_available() {
            tracing::debug!("refusing unavailable track {}", track.uri());
            return false;
        }
        self.tracks.push(track);
        if self.shuffle {
            self.rebuild_order(self.cur);
        }
        true
    }

    /// Clear and refill. The caller must have stopped the transport first;
    /// the cursor always comes back unset.
    pub fn replace_with(&mut self, tracks: Vec<TrackRef>) -> usize {
        self.tracks.clear();
        self.cur = None;
        let mut added = 0;
        for track in tracks {
            if self.append(track) {
                added += 1;
            }
        }
        added
    }

    /// Remove `count` tracks starting at `start`, clamped to the queue end.
    pub fn remove_range(&mut self, start: usize, count: usize) -> RemoveOutcome {
        if start >= self.tracks.len() || count == 0 {
            return RemoveOutcome::Kept;
        }
        let count = count.min(self.tracks.len() - start);
        self.tracks.drain(start..start + count);

        let outcome = match self.cur {
            Some(cur) if cur >= start && cur < start + count => {
                self.cur = None;
                RemoveOutcome::RemovedCurrent
            }
            Some(cur) if cur >= start + count => {
                self.cur = Some(cur - count);
                RemoveOutcome::Kept
            }
            _ => RemoveOutcome::Kept,
        };
        if self.shuffle {
            self.rebuild_order(self.cur);
        }
        outcome
    }

    pub fn clear(&mut self) -> RemoveOutcome {
        let len = self.tracks.len();
        self.remove_range(0, len)
    }

    /// Move the cursor without touching playback. Out-of-range indexes
    /// leave the cursor where it was.
    pub fn goto(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.cur = Some(index);
        if self.shuffle {
            self.order_pos = self.order.iter().position(|&i| i == index).unwrap_or(0);
        }
        true
    }

    pub fn unset_cursor(&mut self) {
        self.cur = None;
    }

    /// Clamp the cursor into range and return it, selecting track 0 when it
    /// was unset. Used by `play` from stopped. Returns None on an empty
    /// queue.
    pub fn cursor_for_play(&mut self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let cur = match self.cur {
            None => 0,
            Some(c) if c >= self.tracks.len() => self.tracks.len() - 1,
            Some(c) => c,
        };
        self.cur = Some(cur);
        if self.shuffle {
            self.order_pos = self.order.iter().position(|&i| i == cur).unwrap_or(0);
        }
        Some(cur)
    }

    /// Step the cursor by one logical position. Returns the new cursor, or
    /// None when the move runs off the queue (caller stops playback).
    pub fn advance(&mut self, step: i32) -> Option<usize> {
        if self.tracks.is_empty() {
            self.cur = None;
            return None;
        }
        if self.shuffle {
            return self.advance_shuffled(step);
        }

        let len = self.tracks.len() as i64;
        let next = match self.cur {
            Some(c) => c as i64 + step as i64,
            // From stopped, "next" starts at the head; "prev" has nowhere
            // to go.
            None if step > 0 => 0,
            None => return None,
        };

        let next = if self.repeat {
            next.rem_euclid(len)
        } else if next < 0 || next >= len {
            self.cur = None;
            return None;
        } else {
            next
        };
        self.cur = Some(next as usize);
        self.cur
    }

    fn advance_shuffled(&mut self, step: i32) -> Option<usize> {
        if self.order.len() != self.tracks.len() {
            self.rebuild_order(self.cur);
        }
        let len = self.order.len();
        if self.cur.is_none() {
            if step < 0 {
                return None;
            }
            self.order_pos = 0;
            self.cur = Some(self.order[0]);
            return self.cur;
        }

        if step >= 0 {
            if self.order_pos + 1 < len {
                self.order_pos += 1;
            } else if self.repeat {
                // Wrapped: re-deal, keeping the just-finished track out of
                // the lead slot so it does not play twice in a row.
                let finished = self.cur;
                self.rebuild_order(None);
                if len > 1 {
                    if let Some(finished) = finished {
                        if self.order[0] == finished {
                            let swap_with = rand::thread_rng().gen_range(1..len);
                            self.order.swap(0, swap_with);
                        }
                    }
                }
                self.order_pos = 0;
            } else {
                self.cur = None;
                return None;
            }
        } else if self.order_pos > 0 {
            self.order_pos -= 1;
        } else if self.repeat {
            self.order_pos = len - 1;
        } else {
            self.cur = None;
            return None;
        }

        self.cur = Some(self.order[self.order_pos]);
        self.cur
    }

    pub fn set_repeat(&mut self, on: bool) {
        self.repeat = on;
    }

    /// Toggling shuffle on keeps the current track current: it is pinned to
    /// the head of the fresh permutation and only later advances shuffle.
    pub fn set_shuffle(&mut self, on: bool) {
        self.shuffle = on;
        if on {
            self.rebuild_order(self.cur);
        } else {
            self.order.clear();
            self.order_pos = 0;
        }
    }

    fn rebuild_order(&mut self, pin_first: Option<usize>) {
        let len = self.tracks.len();
        let mut order: Vec<usize> = (0..len).collect();
        let mut rng = rand::thread_rng();
        for i in (1..len).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
        if let Some(pin) = pin_first {
            if let Some(pos) = order.iter().position(|&i| i == pin) {
                order.swap(0, pos);
            }
        }
        self.order = order;
        self.order_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::services::catalog::CatalogTrack;

    struct FakeTrack {
        uri: String,
        available: bool,
    }

    impl CatalogTrack for FakeTrack {
        fn uri(&self) -> String {
            self.uri.clone()
        }
        fn is_loaded(&self) -> bool {
            true
        }
        fn is_available(&self) -> bool {
            self.available
        }
        fn duration_ms(&self) -> u32 {
            3000
        }
        fn title(&self) -> String {
            self.uri.clone()
        }
        fn artists(&self) -> Vec<String> {
            vec!["artist".to_string()]
        }
        fn album(&self) -> String {
            "album".to_string()
        }
        fn cover_uri(&self) -> Option<String> {
            None
        }
        fn popularity(&self) -> Option<u8> {
            None
        }
        fn starred(&self) -> bool {
            false
        }
    }

    fn track(n: usize) -> TrackRef {
        Arc::new(FakeTrack {
            uri: format!("test:track:{}", n),
            available: true,
        })
    }

    fn queue_of(n: usize) -> Queue {
        let mut q = Queue::new();
        for i in 0..n {
            assert!(q.append(track(i)));
        }
        q
    }

    #[test]
    fn append_refuses_unavailable() {
        let mut q = Queue::new();
        assert!(!q.append(Arc::new(FakeTrack {
            uri: "test:track:locked".to_string(),
            available: false,
        })));
        assert!(q.is_empty());
    }

    #[test]
    fn remove_before_cursor_shifts_it() {
        let mut q = queue_of(5);
        q.goto(3);
        assert_eq!(q.remove_range(0, 2), RemoveOutcome::Kept);
        assert_eq!(q.cursor(), Some(1));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn remove_after_cursor_keeps_it() {
        let mut q = queue_of(5);
        q.goto(1);
        assert_eq!(q.remove_range(3, 2), RemoveOutcome::Kept);
        assert_eq!(q.cursor(), Some(1));
    }

    #[test]
    fn remove_current_unsets_cursor() {
        let mut q = queue_of(3);
        q.goto(1);
        assert_eq!(q.remove_range(1, 1), RemoveOutcome::RemovedCurrent);
        assert_eq!(q.cursor(), None);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn remove_range_clamps_to_end() {
        let mut q = queue_of(3);
        q.remove_range(1, 100);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn advance_walks_and_falls_off() {
        let mut q = queue_of(2);
        q.goto(0);
        assert_eq!(q.advance(1), Some(1));
        assert_eq!(q.advance(1), None);
        assert_eq!(q.cursor(), None);
    }

    #[test]
    fn advance_with_repeat_wraps() {
        let mut q = queue_of(3);
        q.set_repeat(true);
        q.goto(2);
        assert_eq!(q.advance(1), Some(0));
        assert_eq!(q.advance(-1), Some(2));
    }

    #[test]
    fn advance_from_stopped_starts_at_head() {
        let mut q = queue_of(3);
        assert_eq!(q.advance(1), Some(0));
    }

    #[test]
    fn cursor_for_play_clamps_past_end() {
        let mut q = queue_of(3);
        q.goto(2);
        q.remove_range(2, 1);
        // Cursor was removed; play restarts at the head.
        assert_eq!(q.cursor_for_play(), Some(0));

        let mut q = queue_of(3);
        q.cur = Some(7);
        assert_eq!(q.cursor_for_play(), Some(2));
    }

    #[test]
    fn shuffle_order_is_a_bijection() {
        let mut q = queue_of(10);
        q.goto(4);
        q.set_shuffle(true);
        let mut seen: Vec<usize> = q.order.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        // Current track stays current.
        assert_eq!(q.order[0], 4);
        assert_eq!(q.cursor(), Some(4));
    }

    #[test]
    fn shuffle_without_repeat_stops_at_end() {
        let mut q = queue_of(4);
        q.goto(0);
        q.set_shuffle(true);
        let mut visited = vec![0usize];
        while let Some(i) = q.advance(1) {
            visited.push(i);
        }
        visited.sort_unstable();
        assert_eq!(visited, vec![0, 1, 2, 3]);
        assert_eq!(q.cursor(), None);
    }

    #[test]
    fn shuffle_repeat_visits_fairly() {
        let mut q = queue_of(3);
        q.set_repeat(true);
        q.set_shuffle(true);
        q.cursor_for_play();

        let mut visits: HashMap<usize, usize> = HashMap::new();
        *visits.entry(q.cursor().unwrap()).or_default() += 1;
        let mut last = q.cursor().unwrap();
        for _ in 0..299 {
            let cur = q.advance(1).expect("repeat never stops");
            // Re-deal never replays the track that just finished.
            if q.len() > 1 {
                assert_ne!(cur, last, "immediate repeat after wrap");
            }
            last = cur;
            *visits.entry(cur).or_default() += 1;
        }
        for idx in 0..3 {
            let n = visits.get(&idx).copied().unwrap_or(0);
            assert!((90..=110).contains(&n), "track {} visited {} times", idx, n);
        }
    }
}
