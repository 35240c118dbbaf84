//! Pointer-event subscriptions for the parameter map.
//!
//! Exactly one subscription is active at a time: either single clicks or
//! continuous pointer motion. Switching modes cancels the previous
//! subscription before installing the new one.

use crate::data::spaxel::{SpaxelPlot, SpaxelSource};
use crate::error::ViewerError;

/// Which pointer events a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Click,
    Motion,
}

/// A pointer event on the image panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    /// Data coordinates, `None` when the pointer is not over the plot axes.
    pub position: Option<[f64; 2]>,
}

impl PointerEvent {
    pub fn click(position: Option<[f64; 2]>) -> Self {
        Self {
            kind: PointerKind::Click,
            position,
        }
    }

    pub fn motion(position: Option<[f64; 2]>) -> Self {
        Self {
            kind: PointerKind::Motion,
            position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    SingleShot,
    Follow,
}

/// Handle of an installed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub id: u64,
    pub kind: PointerKind,
}

/// Convert data coordinates to the nearest grid index.
///
/// Pixel centres sit on integer coordinates, so `floor(v + 0.5)` picks
/// the pixel under the pointer.
pub fn resolve_index(position: Option<[f64; 2]>) -> Result<(usize, usize), ViewerError> {
    let [x, y] = position.ok_or(ViewerError::OutsidePlotArea)?;
    let xi = (x + 0.5).floor() as i64;
    let yi = (y + 0.5).floor() as i64;
    if xi < 0 || yi < 0 {
        return Err(ViewerError::IndexError { x: xi, y: yi });
    }
    Ok((xi as usize, yi as usize))
}

// ---------------------------------------------------------------------------
// InteractionController
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InteractionController {
    active: Option<Subscription>,
    next_id: u64,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        match self.active.map(|s| s.kind) {
            None => Mode::Idle,
            Some(PointerKind::Click) => Mode::SingleShot,
            Some(PointerKind::Motion) => Mode::Follow,
        }
    }

    pub fn active(&self) -> Option<Subscription> {
        self.active
    }

    /// React to clicks on the map from now on.
    pub fn enter_single_shot(&mut self) -> Subscription {
        self.subscribe(PointerKind::Click)
    }

    /// Follow the pointer across the map from now on.
    pub fn enter_follow(&mut self) -> Subscription {
        self.subscribe(PointerKind::Motion)
    }

    /// Drop the active subscription, if any.
    pub fn cancel(&mut self) -> Option<Subscription> {
        let old = self.active.take();
        if let Some(sub) = old {
            log::debug!("Cancelled pointer subscription {} ({:?})", sub.id, sub.kind);
        }
        old
    }

    fn subscribe(&mut self, kind: PointerKind) -> Subscription {
        self.cancel();
        self.next_id += 1;
        let sub = Subscription {
            id: self.next_id,
            kind,
        };
        log::debug!("Subscribed to {kind:?} events as {}", sub.id);
        self.active = Some(sub);
        sub
    }

    /// Whether the active subscription listens to this event.
    pub fn accepts(&self, event: &PointerEvent) -> bool {
        self.active.is_some_and(|s| s.kind == event.kind)
    }

    /// Run the handler for `event`.
    ///
    /// Returns `None` when no subscription listens to this kind of event.
    /// Otherwise the pointer is resolved to a spaxel and rendered by
    /// `source`.
    pub fn dispatch<S: SpaxelSource + ?Sized>(
        &self,
        event: &PointerEvent,
        source: &S,
    ) -> Option<Result<SpaxelPlot, ViewerError>> {
        if !self.accepts(event) {
            return None;
        }
        Some(resolve_index(event.position).and_then(|(x, y)| source.render_spaxel(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records every spaxel it is asked to render.
    struct Recorder {
        width: usize,
        height: usize,
        calls: Cell<usize>,
        last: RefCell<Option<(usize, usize)>>,
    }

    impl Recorder {
        fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                calls: Cell::new(0),
                last: RefCell::new(None),
            }
        }
    }

    impl SpaxelSource for Recorder {
        fn dimensions(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn render_spaxel(&self, x: usize, y: usize) -> Result<SpaxelPlot, ViewerError> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = Some((x, y));
            if x >= self.width || y >= self.height {
                return Err(ViewerError::IndexError {
                    x: x as i64,
                    y: y as i64,
                });
            }
            Ok(SpaxelPlot {
                x,
                y,
                wavelength: Vec::new(),
                norm_exponent: 0,
                observed: Vec::new(),
                stellar: Vec::new(),
                continuum: Vec::new(),
                model: Vec::new(),
                components: Vec::new(),
                summary: format!("({x}, {y})"),
            })
        }
    }

    #[test]
    fn test_nearest_pixel_rounding() {
        assert_eq!(resolve_index(Some([2.4, 3.6])), Ok((2, 4)));
        assert_eq!(resolve_index(Some([-0.4, 0.49])), Ok((0, 0)));
        assert_eq!(resolve_index(Some([1.5, 2.5])), Ok((2, 3)));
    }

    #[test]
    fn test_missing_coordinates() {
        assert_eq!(resolve_index(None), Err(ViewerError::OutsidePlotArea));
    }

    #[test]
    fn test_negative_index() {
        assert_eq!(
            resolve_index(Some([-0.6, 2.0])),
            Err(ViewerError::IndexError { x: -1, y: 2 })
        );
    }

    #[test]
    fn test_idle_ignores_events() {
        let ctl = InteractionController::new();
        let src = Recorder::new(4, 4);
        assert_eq!(ctl.mode(), Mode::Idle);
        assert!(ctl.dispatch(&PointerEvent::click(Some([1.0, 1.0])), &src).is_none());
        assert_eq!(src.calls.get(), 0);
    }

    #[test]
    fn test_switching_keeps_one_subscription() {
        let mut ctl = InteractionController::new();
        let follow = ctl.enter_follow();
        assert_eq!(ctl.mode(), Mode::Follow);

        let click = ctl.enter_single_shot();
        assert_eq!(ctl.mode(), Mode::SingleShot);
        assert_ne!(follow.id, click.id);
        assert_eq!(ctl.active(), Some(click));

        let src = Recorder::new(4, 4);
        assert!(ctl.dispatch(&PointerEvent::motion(Some([1.0, 1.0])), &src).is_none());
        let out = ctl.dispatch(&PointerEvent::click(Some([1.0, 2.0])), &src);
        assert!(matches!(out, Some(Ok(_))));
        assert_eq!(src.calls.get(), 1);
        assert_eq!(*src.last.borrow(), Some((1, 2)));
    }

    #[test]
    fn test_repeated_events_reuse_subscription() {
        let mut ctl = InteractionController::new();
        let sub = ctl.enter_follow();
        let src = Recorder::new(4, 4);
        for i in 0..3 {
            let pos = Some([i as f64, 0.0]);
            assert!(ctl.dispatch(&PointerEvent::motion(pos), &src).is_some());
        }
        assert_eq!(src.calls.get(), 3);
        assert_eq!(ctl.active(), Some(sub));
    }

    #[test]
    fn test_reentering_same_mode_replaces_subscription() {
        let mut ctl = InteractionController::new();
        let first = ctl.enter_single_shot();
        let second = ctl.enter_single_shot();
        assert_ne!(first, second);
        assert_eq!(ctl.active(), Some(second));
        assert_eq!(ctl.cancel(), Some(second));
        assert_eq!(ctl.cancel(), None);
        assert_eq!(ctl.mode(), Mode::Idle);
    }

    #[test]
    fn test_dispatch_errors() {
        let mut ctl = InteractionController::new();
        ctl.enter_single_shot();
        let src = Recorder::new(4, 4);

        let out = ctl.dispatch(&PointerEvent::click(None), &src);
        assert_eq!(out, Some(Err(ViewerError::OutsidePlotArea)));
        let out = ctl.dispatch(&PointerEvent::click(Some([-2.0, 0.0])), &src);
        assert!(matches!(out, Some(Err(ViewerError::IndexError { .. }))));
        assert_eq!(src.calls.get(), 0);

        let out = ctl.dispatch(&PointerEvent::click(Some([9.0, 0.0])), &src);
        assert_eq!(out, Some(Err(ViewerError::IndexError { x: 9, y: 0 })));
        assert_eq!(src.calls.get(), 1);
    }
}
