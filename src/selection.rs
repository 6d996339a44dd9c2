//! Region selection over the attached audio source.
//!
//! Pointer interaction is reduced to a small set of [`RegionEvent`]s. Every
//! event carries the generation it was produced under; events from a source
//! that is no longer attached are dropped.

use std::sync::Arc;

use crate::audio::AudioSource;
use crate::player::Playback;
use crate::range::TimeRange;

/// Discrete inputs consumed by [`SelectionController::on_region_changed`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegionEvent {
    /// The source's duration became known.
    Ready { duration: f64 },
    /// Whole region dragged.
    Moved { start: f64, end: f64 },
    /// One edge dragged.
    Resized { start: f64, end: f64 },
    /// Final position after a drag.
    DragEnded { start: f64, end: f64 },
    /// Click outside a drag. Moves the playhead only.
    Seek { at: f64 },
}

pub struct SelectionController {
    playback: Box<dyn Playback>,
    generation: u64,
    source: Option<Arc<AudioSource>>,
    /// Duration announced by `Ready`; later updates normalize against it.
    duration: Option<f64>,
    range: Option<TimeRange>,
}

impl SelectionController {
    pub fn new(playback: Box<dyn Playback>) -> Self {
        Self {
            playback,
            generation: 0,
            source: None,
            duration: None,
            range: None,
        }
    }

    /// Binds a newly loaded source, releasing the previous one first.
    ///
    /// Returns the generation that region events for this source must carry.
    /// A decoded source already knows its duration, so the default selection
    /// is in place when this returns.
    pub fn attach(&mut self, source: Arc<AudioSource>) -> u64 {
        self.detach();
        self.playback.bind(source.clone());
        let duration = source.duration_secs();
        self.source = Some(source);
        log::debug!("selection attached, generation {}", self.generation);

        if duration > 0.0 {
            self.on_region_changed(self.generation, RegionEvent::Ready { duration });
        }
        self.generation
    }

    /// Releases the playback binding and invalidates outstanding events.
    pub fn detach(&mut self) {
        self.playback.release();
        self.source = None;
        self.duration = None;
        self.range = None;
        self.generation += 1;
    }

    /// Applies one interactive update and returns the resulting selection.
    ///
    /// Returns `None` when nothing changed: stale generation, no source,
    /// a seek, or a region that does not normalize (the previous range stays).
    pub fn on_region_changed(&mut self, generation: u64, event: RegionEvent) -> Option<TimeRange> {
        if generation != self.generation || self.source.is_none() {
            log::debug!("dropping {event:?} from generation {generation}");
            return None;
        }

        let next = match event {
            RegionEvent::Ready { duration } => {
                let silent = self.source.as_ref().map_or(true, |s| s.duration_secs() <= 0.0);
                if self.range.is_some() || silent {
                    return None;
                }
                let full = TimeRange::full_range(duration).ok()?;
                self.duration = Some(duration);
                full
            }
            RegionEvent::Moved { start, end }
            | RegionEvent::Resized { start, end }
            | RegionEvent::DragEnded { start, end } => {
                TimeRange::normalize(start, end, self.duration()).ok()?
            }
            RegionEvent::Seek { at } => {
                self.playback.seek(at.clamp(0.0, self.duration()));
                return None;
            }
        };

        self.range = Some(next);
        Some(next)
    }

    /// Resets the region to the whole source, ignoring the default cap.
    pub fn select_full(&mut self) -> Option<TimeRange> {
        self.source.as_ref()?;
        let duration = self.duration();
        let full = TimeRange::normalize(0.0, duration, duration).ok()?;
        self.range = Some(full);
        Some(full)
    }

    pub fn play_selection(&mut self) {
        if let Some(range) = self.range {
            self.playback.play_range(range.start(), range.end());
        }
    }

    pub fn toggle_playback(&mut self) {
        if self.duration() > 0.0 {
            self.playback.toggle();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn range(&self) -> Option<TimeRange> {
        self.range
    }

    pub fn source(&self) -> Option<&Arc<AudioSource>> {
        self.source.as_ref()
    }

    fn duration(&self) -> f64 {
        match (&self.source, self.duration) {
            (Some(_), Some(announced)) => announced,
            (Some(source), None) => source.duration_secs(),
            (None, _) => 0.0,
        }
    }
}

impl Drop for SelectionController {
    fn drop(&mut self) {
        self.playback.release();
    }
}

/// What a drag grabbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grip {
    Body,
    StartEdge,
    EndEdge,
}

/// One pointer drag over the region, in seconds.
#[derive(Clone, Copy, Debug)]
pub struct RegionDrag {
    grip: Grip,
    anchor: f64,
    origin: TimeRange,
}

impl RegionDrag {
    /// Starts a drag at `at`. Presses within `edge_tolerance` of an edge
    /// resize; presses inside the region move it; anything else is not a
    /// region drag.
    pub fn begin(origin: TimeRange, at: f64, edge_tolerance: f64) -> Option<Self> {
        let to_start = (at - origin.start()).abs();
        let to_end = (at - origin.end()).abs();
        let grip = if to_start <= edge_tolerance && to_start <= to_end {
            Grip::StartEdge
        } else if to_end <= edge_tolerance {
            Grip::EndEdge
        } else if origin.contains(at) {
            Grip::Body
        } else {
            return None;
        };
        Some(Self {
            grip,
            anchor: at,
            origin,
        })
    }

    pub fn grip(&self) -> Grip {
        self.grip
    }

    pub fn update(&self, at: f64) -> RegionEvent {
        let (start, end) = self.position(at);
        match self.grip {
            Grip::Body => RegionEvent::Moved { start, end },
            Grip::StartEdge | Grip::EndEdge => RegionEvent::Resized { start, end },
        }
    }

    pub fn finish(&self, at: f64) -> RegionEvent {
        let (start, end) = self.position(at);
        RegionEvent::DragEnded { start, end }
    }

    fn position(&self, at: f64) -> (f64, f64) {
        let o = self.origin;
        match self.grip {
            Grip::Body => {
                let len = o.len();
                let start = (o.start() + at - self.anchor).clamp(0.0, o.duration() - len);
                (start, start + len)
            }
            Grip::StartEdge => (at, o.end()),
            Grip::EndEdge => (o.start(), at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    enum Call {
        Bind(String),
        Range(f64, f64),
        Toggle,
        Seek(f64),
        Release,
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Call>>>);

    impl Playback for Recorder {
        fn bind(&mut self, source: Arc<AudioSource>) {
            self.0.borrow_mut().push(Call::Bind(source.name.clone()));
        }
        fn play_range(&mut self, start: f64, end: f64) {
            self.0.borrow_mut().push(Call::Range(start, end));
        }
        fn toggle(&mut self) {
            self.0.borrow_mut().push(Call::Toggle);
        }
        fn seek(&mut self, at: f64) {
            self.0.borrow_mut().push(Call::Seek(at));
        }
        fn release(&mut self) {
            self.0.borrow_mut().push(Call::Release);
        }
        fn is_playing(&self) -> bool {
            false
        }
    }

    fn source(name: &str, secs: usize) -> Arc<AudioSource> {
        Arc::new(AudioSource::from_pcm(name, vec![0.0; secs * 10], 10, 1))
    }

    #[test]
    fn attach_emits_default_selection() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        controller.attach(source("long", 900));
        let range = controller.range().unwrap();
        assert_eq!((range.start(), range.end(), range.duration()), (0.0, 600.0, 900.0));
    }

    #[test]
    fn replacing_source_releases_previous_binding() {
        let recorder = Recorder::default();
        let mut controller = SelectionController::new(Box::new(recorder.clone()));
        controller.attach(source("a", 10));
        controller.attach(source("b", 10));
        drop(controller);

        let calls = recorder.0.borrow();
        let binds: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, Call::Bind(_) | Call::Release))
            .collect();
        assert_eq!(
            binds,
            [
                &Call::Release,
                &Call::Bind("a".into()),
                &Call::Release,
                &Call::Bind("b".into()),
                &Call::Release,
            ]
        );
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        let old = controller.attach(source("a", 180));
        let current = controller.attach(source("b", 120));

        let stale = RegionEvent::DragEnded { start: 10.0, end: 50.0 };
        assert_eq!(controller.on_region_changed(old, stale), None);
        assert_eq!(controller.range().unwrap().end(), 120.0);

        let applied = controller.on_region_changed(current, stale).unwrap();
        assert_eq!((applied.start(), applied.end()), (10.0, 50.0));
    }

    #[test]
    fn invalid_update_keeps_previous_range() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        let gen = controller.attach(source("a", 180));
        controller.on_region_changed(gen, RegionEvent::Resized { start: 10.0, end: 50.0 });

        let rejected = controller.on_region_changed(gen, RegionEvent::Resized { start: 60.0, end: 50.0 });
        assert_eq!(rejected, None);
        let kept = controller.range().unwrap();
        assert_eq!((kept.start(), kept.end()), (10.0, 50.0));
    }

    #[test]
    fn updates_are_idempotent_and_clamped() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        let gen = controller.attach(source("a", 180));
        let event = RegionEvent::Moved { start: 170.0, end: 200.0 };
        let first = controller.on_region_changed(gen, event);
        let second = controller.on_region_changed(gen, event);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().end(), 180.0);
    }

    #[test]
    fn select_full_ignores_default_cap() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        controller.attach(source("long", 900));
        assert_eq!(controller.select_full().unwrap().end(), 900.0);
    }

    #[test]
    fn playback_commands_do_not_touch_range() {
        let recorder = Recorder::default();
        let mut controller = SelectionController::new(Box::new(recorder.clone()));
        let gen = controller.attach(source("a", 180));
        controller.on_region_changed(gen, RegionEvent::DragEnded { start: 10.0, end: 50.0 });
        let before = controller.range();

        controller.play_selection();
        controller.toggle_playback();
        assert_eq!(controller.on_region_changed(gen, RegionEvent::Seek { at: 500.0 }), None);

        assert_eq!(controller.range(), before);
        let calls = recorder.0.borrow();
        assert!(calls.contains(&Call::Range(10.0, 50.0)));
        assert!(calls.contains(&Call::Toggle));
        assert!(calls.contains(&Call::Seek(180.0)));
    }

    #[test]
    fn updates_follow_the_announced_duration() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        let gen = controller.attach(source("a", 180));
        assert_eq!(controller.range().unwrap().duration(), 180.0);

        let resized = controller
            .on_region_changed(gen, RegionEvent::Resized { start: 20.0, end: 400.0 })
            .unwrap();
        assert_eq!((resized.end(), resized.duration()), (180.0, 180.0));
        assert_eq!(controller.select_full().unwrap().duration(), 180.0);
    }

    #[test]
    fn silent_source_cannot_be_played() {
        let recorder = Recorder::default();
        let mut controller = SelectionController::new(Box::new(recorder.clone()));
        controller.attach(source("empty", 0));
        assert_eq!(controller.range(), None);

        controller.toggle_playback();
        controller.play_selection();
        assert!(!recorder.0.borrow().contains(&Call::Toggle));
        assert!(!recorder.0.borrow().iter().any(|c| matches!(c, Call::Range(..))));
    }

    fn assert_within(range: TimeRange, duration: f64) {
        assert!(
            0.0 <= range.start() && range.start() < range.end() && range.end() <= duration,
            "{range:?} escapes a {duration}s source"
        );
        assert_eq!(range.duration(), duration);
    }

    #[test]
    fn random_drags_stay_inside_the_source() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let secs = rng.gen_range(1..2000);
            let duration = secs as f64;
            let mut controller = SelectionController::new(Box::new(Recorder::default()));
            let gen = controller.attach(source("r", secs));
            assert_within(controller.range().unwrap(), duration);

            for _ in 0..40 {
                let origin = controller.range().unwrap();
                let press = rng.gen_range(-10.0..duration + 10.0);
                let Some(drag) = RegionDrag::begin(origin, press, duration * 0.01) else {
                    continue;
                };
                for _ in 0..5 {
                    let at = rng.gen_range(-duration..duration * 2.0);
                    controller.on_region_changed(gen, drag.update(at));
                    assert_within(controller.range().unwrap(), duration);
                }
                let at = rng.gen_range(-duration..duration * 2.0);
                controller.on_region_changed(gen, drag.finish(at));
                let after = controller.range().unwrap();
                assert_within(after, duration);
                if drag.grip() == Grip::Body && controller.range() != Some(origin) {
                    assert!((after.len() - origin.len()).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn nothing_is_emitted_without_a_source() {
        let mut controller = SelectionController::new(Box::new(Recorder::default()));
        let gen = controller.generation();
        assert_eq!(
            controller.on_region_changed(gen, RegionEvent::Ready { duration: 30.0 }),
            None
        );
        assert_eq!(controller.select_full(), None);
    }

    #[test]
    fn body_drag_preserves_length_within_source() {
        let origin = TimeRange::normalize(10.0, 50.0, 180.0).unwrap();
        let drag = RegionDrag::begin(origin, 30.0, 1.0).unwrap();
        assert_eq!(drag.grip(), Grip::Body);
        assert_eq!(drag.update(40.0), RegionEvent::Moved { start: 20.0, end: 60.0 });
        assert_eq!(drag.update(0.0), RegionEvent::Moved { start: 0.0, end: 40.0 });
        assert_eq!(drag.finish(500.0), RegionEvent::DragEnded { start: 140.0, end: 180.0 });
    }

    #[test]
    fn edge_drags_resize() {
        let origin = TimeRange::normalize(10.0, 50.0, 180.0).unwrap();
        let start = RegionDrag::begin(origin, 10.5, 1.0).unwrap();
        assert_eq!(start.grip(), Grip::StartEdge);
        assert_eq!(start.update(5.0), RegionEvent::Resized { start: 5.0, end: 50.0 });

        let end = RegionDrag::begin(origin, 49.2, 1.0).unwrap();
        assert_eq!(end.grip(), Grip::EndEdge);
        assert_eq!(end.finish(70.0), RegionEvent::DragEnded { start: 10.0, end: 70.0 });

        assert!(RegionDrag::begin(origin, 100.0, 1.0).is_none());
    }
}
