use crate::Vec2;

/// Node lattice geometry. Node `(0, 0)` sits at `origin` (bottom-left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lattice2 {
    origin: Vec2,
    width: usize,
    height: usize,
    cellsize: Vec2,
}

impl Lattice2 {
    pub fn new(origin: Vec2, width: usize, height: usize, cellsize: Vec2) -> Self {
        assert!(width > 0, "width must be > 0");
        assert!(height > 0, "height must be > 0");
        assert!(
            cellsize.x > 0.0 && cellsize.y > 0.0,
            "cellsize must be > 0"
        );
        Self {
            origin,
            width,
            height,
            cellsize,
        }
    }

    /// Lattice spanning `size` world units; one node per cell corner.
    pub fn spanning(origin: Vec2, size: Vec2, cellsize: Vec2) -> Self {
        let width = (size.x / cellsize.x).round().max(0.0) as usize + 1;
        let height = (size.y / cellsize.y).round().max(0.0) as usize + 1;
        Self::new(origin, width, height, cellsize)
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cellsize(&self) -> Vec2 {
        self.cellsize
    }

    pub fn cell_area(&self) -> f32 {
        self.cellsize.x * self.cellsize.y
    }

    pub fn size(&self) -> usize {
        self.width * self.height
    }

    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    /// Checked index for signed lattice coordinates.
    pub fn try_idx(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.idx(x, y))
    }

    /// World position expressed in (fractional) node coordinates.
    pub fn to_grid(&self, pos: Vec2) -> Vec2 {
        (pos - self.origin).div_elem(self.cellsize)
    }

    /// Lower-left node of the 4x4 kernel stencil around a grid-space position.
    pub fn stencil_base(&self, grid_pos: Vec2) -> (i32, i32) {
        (
            grid_pos.x.floor() as i32 - 1,
            grid_pos.y.floor() as i32 - 1,
        )
    }

    /// Whether the whole 4x4 stencil around `grid_pos` lies inside the lattice.
    pub fn contains_stencil(&self, grid_pos: Vec2) -> bool {
        if !grid_pos.is_finite() {
            return false;
        }
        let (bx, by) = self.stencil_base(grid_pos);
        bx >= 0 && by >= 0 && bx + 3 < self.width as i32 && by + 3 < self.height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanning_counts_corners() {
        let lattice = Lattice2::spanning(Vec2::zero(), Vec2::new(4.0, 2.0), Vec2::new(1.0, 0.5));
        assert_eq!(lattice.width(), 5);
        assert_eq!(lattice.height(), 5);
        assert_eq!(lattice.size(), 25);
    }

    #[test]
    fn idx_is_row_major_from_bottom_left() {
        let lattice = Lattice2::new(Vec2::zero(), 3, 2, Vec2::splat(1.0));
        assert_eq!(lattice.idx(2, 1), 5);
        assert_eq!(lattice.coords(5), (2, 1));
        assert_eq!(lattice.try_idx(-1, 0), None);
        assert_eq!(lattice.try_idx(3, 0), None);
        assert_eq!(lattice.try_idx(1, 1), Some(4));
    }

    #[test]
    fn to_grid_measures_from_origin_in_cells() {
        let lattice = Lattice2::new(Vec2::new(-1.0, 2.0), 6, 6, Vec2::new(0.5, 0.25));
        assert_eq!(lattice.to_grid(Vec2::new(0.5, 3.0)), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn stencil_containment_needs_margin() {
        let lattice = Lattice2::new(Vec2::zero(), 6, 6, Vec2::splat(1.0));
        assert!(lattice.contains_stencil(Vec2::new(2.5, 2.5)));
        assert!(lattice.contains_stencil(Vec2::new(1.0, 1.0)));
        assert!(!lattice.contains_stencil(Vec2::new(0.5, 2.5)));
        assert!(!lattice.contains_stencil(Vec2::new(2.5, 5.0)));
    }
}
