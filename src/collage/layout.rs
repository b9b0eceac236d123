use super::ComposeError;

/// Near-square grid for a collage of `photo_count` artworks.
///
/// Columns are chosen first (`ceil(sqrt(n))`), rows are whatever is needed to
/// fit the remainder, so ties lean towards wider grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollageLayout {
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub photo_count: usize,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl CollageLayout {
    /// Calculate the grid layout for `photo_count` square cells of `cell_size` pixels.
    pub fn calculate(photo_count: usize, cell_size: u32) -> Result<Self, ComposeError> {
        if photo_count == 0 {
            return Err(ComposeError::Empty);
        }

        let cols = ceil_sqrt(photo_count);
        let rows = photo_count.div_ceil(cols);

        let too_large = || ComposeError::CanvasTooLarge {
            photo_count,
            cell_size,
        };
        let grid_cols = u32::try_from(cols).map_err(|_| too_large())?;
        let grid_rows = u32::try_from(rows).map_err(|_| too_large())?;
        grid_cols.checked_mul(cell_size).ok_or_else(too_large)?;
        grid_rows.checked_mul(cell_size).ok_or_else(too_large)?;

        Ok(CollageLayout {
            grid_rows,
            grid_cols,
            photo_count,
            cell_width: cell_size,
            cell_height: cell_size,
        })
    }

    pub fn canvas_width(&self) -> u32 {
        self.grid_cols * self.cell_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.grid_rows * self.cell_height
    }

    /// Row-major (row, col) of the cell at `index`.
    pub fn cell(&self, index: usize) -> (u32, u32) {
        let cols = self.grid_cols as usize;
        ((index / cols) as u32, (index % cols) as u32)
    }

    /// Top-left pixel of the cell at `index`.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let (row, col) = self.cell(index);
        (col * self.cell_width, row * self.cell_height)
    }
}

/// Smallest `c` with `c * c >= n`.
fn ceil_sqrt(n: usize) -> usize {
    let mut c = (n as f64).sqrt().ceil() as usize;
    while c > 1 && (c - 1) * (c - 1) >= n {
        c -= 1;
    }
    while c * c < n {
        c += 1;
    }
    c.max(1)
}
