/// Integer pixel range `[x, x + width) × [y, y + height)`.
///
/// May lie partly or entirely outside the image it is later applied to;
/// [`Region::clamp_to`] yields the part that is actually backed by pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Zero or negative extent on either axis.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Saturates at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Intersection with `[0, width) × [0, height)`, or `None` when nothing
    /// of the region falls inside those bounds.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(i32::try_from(width).unwrap_or(i32::MAX));
        let y2 = self.bottom().min(i32::try_from(height).unwrap_or(i32::MAX));

        let clamped = Region::new(x1, y1, x2 - x1, y2 - y1);
        if clamped.is_empty() {
            None
        } else {
            Some(clamped)
        }
    }
}
