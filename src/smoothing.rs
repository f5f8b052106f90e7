use crate::config::CursorConfig;
use crate::landmarks::Point;

/// Piecewise-linear map of `x` from `from` onto `to`, clamped to the ends of `to`.
pub fn interp(x: f32, from: (f32, f32), to: (f32, f32)) -> f32 {
    let (x0, x1) = from;
    let (y0, y1) = to;
    if x1 <= x0 {
        return if x <= x0 { y0 } else { y1 };
    }
    if x <= x0 {
        return y0;
    }
    if x >= x1 {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Maps the tracked fingertip onto the screen and damps per-frame jitter.
///
/// Stage one remaps the inset camera rectangle `[margin, size - margin]` onto
/// the full screen, so the pointer can reach screen edges without the hand
/// leaving the frame. Stage two is a first-order exponential filter:
/// `new = prev + (target - prev) / smoothing`.
#[derive(Debug, Clone)]
pub struct CursorSmoother {
    margin: f32,
    smoothing: f32,
}

impl CursorSmoother {
    pub fn new(margin: u32, smoothing: f32) -> Self {
        Self {
            margin: margin as f32,
            smoothing: smoothing.max(1.0),
        }
    }

    pub fn from_config(config: &CursorConfig) -> Self {
        Self::new(config.frame_margin, config.smoothing)
    }

    fn axis(&self, v: f32, frame: u32, screen: u32) -> f32 {
        let size = frame as f32;
        // margin eats the whole axis: fall back to the full frame
        let (lo, hi) = if 2.0 * self.margin < size {
            (self.margin, size - self.margin)
        } else {
            (0.0, size)
        };
        interp(v, (lo, hi), (0.0, screen as f32))
    }

    /// Screen-space target for a frame-space point, before smoothing.
    pub fn target(&self, p: Point, frame: (u32, u32), screen: (u32, u32)) -> (f32, f32) {
        (
            self.axis(p.x as f32, frame.0, screen.0),
            self.axis(p.y as f32, frame.1, screen.1),
        )
    }

    /// One filter step. With no prior position the target passes through.
    pub fn apply(&self, prev: Option<(f32, f32)>, target: (f32, f32)) -> (f32, f32) {
        match prev {
            None => target,
            Some((px, py)) => (
                px + (target.0 - px) / self.smoothing,
                py + (target.1 - py) / self.smoothing,
            ),
        }
    }

    /// Remap, filter, and store the result back into `prev`.
    pub fn step(
        &self,
        prev: &mut Option<(f32, f32)>,
        p: Point,
        frame: (u32, u32),
        screen: (u32, u32),
    ) -> (f32, f32) {
        let next = self.apply(*prev, self.target(p, frame, screen));
        *prev = Some(next);
        next
    }
}
