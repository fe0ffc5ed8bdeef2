//! Escape-time rendering of a square region of the Mandelbrot set, split
//! into bands of rows and merged back by row index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::shared::Context;
use crate::core::task::Task;
use crate::error::{Error, Result};

/// Rows computed by one atomic task.
pub const ROWS_PER_TASK: u32 = 32;

/// Escape counts keyed by row.
pub type Rows = BTreeMap<u32, Vec<u32>>;

/// The square of the complex plane being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Lower-left corner as (real, imaginary).
    pub corner: (f64, f64),
    /// Edge length in the complex plane.
    pub edge: f64,
    /// Pixels per side.
    pub size: u32,
    pub iteration_limit: u32,
}

impl Region {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Validation("mandelbrot size must be positive".to_string()));
        }
        if self.iteration_limit == 0 {
            return Err(Error::Validation("iteration limit must be positive".to_string()));
        }
        if !(self.edge.is_finite() && self.edge > 0.0) {
            return Err(Error::Validation(format!("invalid edge length {}", self.edge)));
        }
        Ok(())
    }

    /// Iterations until the orbit of the pixel's corner leaves radius 2,
    /// capped at the iteration limit.
    pub fn escape_count(&self, row: u32, col: u32) -> u32 {
        let step = self.edge / f64::from(self.size);
        let c_re = self.corner.0 + f64::from(row) * step;
        let c_im = self.corner.1 + f64::from(col) * step;
        let (mut re, mut im) = (0.0f64, 0.0f64);
        let mut k = 1;
        while re * re + im * im < 4.0 && k < self.iteration_limit {
            let next = re * re - im * im + c_re;
            im = 2.0 * re * im + c_im;
            re = next;
            k += 1;
        }
        k
    }

    pub fn rows(&self, start: u32, end: u32) -> Rows {
        (start..end.min(self.size))
            .map(|row| (row, (0..self.size).map(|col| self.escape_count(row, col)).collect()))
            .collect()
    }

    /// The whole region on the calling thread.
    pub fn render(&self) -> Rows {
        self.rows(0, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mandelbrot {
    /// Rows `start..end` of the region.
    Band { region: Region, start: u32, end: u32 },
    Merge,
}

impl Mandelbrot {
    pub fn whole(region: Region) -> Self {
        Mandelbrot::Band {
            region,
            start: 0,
            end: region.size,
        }
    }
}

impl Task for Mandelbrot {
    type Output = Rows;
    type Shared = ();

    fn is_atomic(&self, _ctx: &Context<()>) -> bool {
        match self {
            Mandelbrot::Band { start, end, .. } => end.saturating_sub(*start) <= ROWS_PER_TASK,
            Mandelbrot::Merge => true,
        }
    }

    fn split(&self, _ctx: &Context<()>) -> Result<Vec<Self>> {
        match self {
            Mandelbrot::Band { region, start, end } => {
                let mid = start + (end - start) / 2;
                Ok(vec![
                    Mandelbrot::Band {
                        region: *region,
                        start: *start,
                        end: mid,
                    },
                    Mandelbrot::Band {
                        region: *region,
                        start: mid,
                        end: *end,
                    },
                ])
            }
            Mandelbrot::Merge => Err(Error::task("merge does not split")),
        }
    }

    fn create_successor(&self) -> Self {
        Mandelbrot::Merge
    }

    fn execute(&self, _ctx: &Context<()>, inputs: &[Rows]) -> Result<Rows> {
        match self {
            Mandelbrot::Band { region, start, end } => Ok(region.rows(*start, *end)),
            Mandelbrot::Merge => {
                let mut merged = Rows::new();
                for band in inputs {
                    merged.extend(band.iter().map(|(row, counts)| (*row, counts.clone())));
                }
                Ok(merged)
            }
        }
    }
}
