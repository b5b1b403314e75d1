//! Neighborhood definitions for focal filters and connectivity rules

use serde::{Deserialize, Serialize};

/// A moving-window shape centered on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// Square window of the given radius: (2r+1)×(2r+1) cells
    Square(usize),
    /// "Plus" kernel: the center and cells along the row/column up to `r`
    Cross(usize),
    /// Circular window of the given radius (in cells)
    Circle(usize),
}

impl Neighborhood {
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Square(r) | Neighborhood::Cross(r) | Neighborhood::Circle(r) => *r,
        }
    }

    /// Width and height of the bounding window
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
            Neighborhood::Cross(r) => {
                let r = *r as isize;
                (dr == 0 && dc.abs() <= r) || (dc == 0 && dr.abs() <= r)
            }
            Neighborhood::Circle(r) => dr * dr + dc * dc <= (*r * *r) as isize,
        }
    }

    /// Relative positions in this neighborhood, center included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::with_capacity(self.size() * self.size());
        for dr in -r..=r {
            for dc in -r..=r {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }
        offsets
    }
}

/// Pixel adjacency rule used to form connected regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbors only (the "plus" kernel)
    #[default]
    Four,
    /// Edge and corner neighbors
    Eight,
}

impl Connectivity {
    /// Neighbor offsets, center excluded
    pub fn offsets(&self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// Offset a cell by `(dr, dc)`, returning `None` when it leaves the grid
#[inline]
pub fn offset_cell(
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let r = row as isize + dr;
    let c = col as isize + dc;
    (r >= 0 && c >= 0 && (r as usize) < rows && (c as usize) < cols).then(|| (r as usize, c as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_offsets() {
        assert_eq!(Neighborhood::Square(1).offsets().len(), 9);
        assert_eq!(Neighborhood::Cross(1).offsets().len(), 5);
        assert_eq!(Neighborhood::Square(45).offsets().len(), 91 * 91);
        assert_eq!(Neighborhood::Circle(2).offsets().len(), 13);
    }

    #[test]
    fn test_connectivity() {
        assert_eq!(Connectivity::Four.offsets().len(), 4);
        assert_eq!(Connectivity::Eight.offsets().len(), 8);
        assert_eq!(Connectivity::default(), Connectivity::Four);
    }

    #[test]
    fn test_offset_cell_bounds() {
        assert_eq!(offset_cell(0, 0, -1, 0, 3, 3), None);
        assert_eq!(offset_cell(1, 1, 1, 1, 3, 3), Some((2, 2)));
        assert_eq!(offset_cell(2, 2, 0, 1, 3, 3), None);
    }
}
