//! Gridded ocean: land mask, tile biology and coordinate conversion.

use crate::biology::{LocalBiology, Species};
use anyhow::{Result, bail};
use ndarray::Array2;

/// Integer grid cell, `x` is the column and `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Point at the middle of the cell.
    pub fn center(&self) -> Vector2 {
        Vector2::new(self.x as f64 + 0.5, self.y as f64 + 0.5)
    }
}

/// Continuous position or displacement in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

impl std::ops::Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x + other.x, self.y + other.y)
    }
}

/// Geographic placement of the grid: lower-left corner and cell size in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub cell_size: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            min_lon: 0.0,
            min_lat: 0.0,
            cell_size: 1.0,
        }
    }
}

/// Ocean grid.
///
/// Altitude is indexed `[y, x]`. Tiles with negative altitude are water and
/// own a [`LocalBiology`], land tiles own nothing.
#[derive(Debug, Clone)]
pub struct NauticalMap {
    altitude: Array2<f64>,
    biology: Array2<Option<LocalBiology>>,
    extent: Extent,
}

impl NauticalMap {
    /// Create a map whose water tiles start with a copy of `initial_biology`.
    pub fn new(
        altitude: Array2<f64>,
        extent: Extent,
        initial_biology: &LocalBiology,
    ) -> Result<Self> {
        if altitude.is_empty() {
            bail!("map must have at least one tile");
        }
        if !(extent.cell_size > 0.0) {
            bail!("cell size must be positive, but is {}", extent.cell_size);
        }
        let biology = altitude.mapv(|alt| (alt < 0.0).then(|| initial_biology.clone()));
        Ok(Self {
            altitude,
            biology,
            extent,
        })
    }

    pub fn width(&self) -> usize {
        self.altitude.ncols()
    }

    pub fn height(&self) -> usize {
        self.altitude.nrows()
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width() && cell.y < self.height()
    }

    pub fn altitude(&self, cell: Cell) -> Option<f64> {
        self.altitude.get([cell.y, cell.x]).copied()
    }

    /// True for in-bounds tiles with negative altitude.
    pub fn is_water(&self, cell: Cell) -> bool {
        self.altitude(cell).is_some_and(|alt| alt < 0.0)
    }

    /// Cell holding a continuous grid position, `None` off the map.
    pub fn cell_at(&self, position: Vector2) -> Option<Cell> {
        if !(position.x >= 0.0 && position.y >= 0.0) {
            return None;
        }
        let cell = Cell::new(position.x.floor() as usize, position.y.floor() as usize);
        self.contains(cell).then_some(cell)
    }

    /// Cell holding a geographic coordinate, `None` off the map.
    pub fn cell_at_coordinates(&self, lon: f64, lat: f64) -> Option<Cell> {
        let position = Vector2::new(
            (lon - self.extent.min_lon) / self.extent.cell_size,
            (lat - self.extent.min_lat) / self.extent.cell_size,
        );
        self.cell_at(position)
    }

    /// Geographic coordinate of the center of `cell`.
    pub fn coordinates(&self, cell: Cell) -> (f64, f64) {
        let center = cell.center();
        (
            self.extent.min_lon + center.x * self.extent.cell_size,
            self.extent.min_lat + center.y * self.extent.cell_size,
        )
    }

    pub fn biology(&self, cell: Cell) -> Option<&LocalBiology> {
        self.biology.get([cell.y, cell.x]).and_then(Option::as_ref)
    }

    pub fn biology_mut(&mut self, cell: Cell) -> Option<&mut LocalBiology> {
        self.biology.get_mut([cell.y, cell.x]).and_then(Option::as_mut)
    }

    /// Replace the biology of a water tile.
    pub fn set_biology(&mut self, cell: Cell, biology: LocalBiology) -> Result<()> {
        match self.biology_mut(cell) {
            Some(slot) => {
                *slot = biology;
                Ok(())
            }
            None => bail!("{cell:?} is not a water tile"),
        }
    }

    /// Every water tile, row by row.
    pub fn water_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.biology
            .indexed_iter()
            .filter(|(_, bio)| bio.is_some())
            .map(|((y, x), _)| Cell::new(x, y))
    }

    /// In-bounds cells within Chebyshev distance `radius` of `cell`, `cell` excluded.
    pub fn moore_neighbors(&self, cell: Cell, radius: usize) -> Vec<Cell> {
        let x_min = cell.x.saturating_sub(radius);
        let y_min = cell.y.saturating_sub(radius);
        let x_max = (cell.x + radius).min(self.width().saturating_sub(1));
        let y_max = (cell.y + radius).min(self.height().saturating_sub(1));
        let mut neighbors = Vec::new();
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let neighbor = Cell::new(x, y);
                if neighbor != cell {
                    neighbors.push(neighbor);
                }
            }
        }
        neighbors
    }

    pub fn total_biomass(&self, species: &Species) -> f64 {
        self.biology
            .iter()
            .flatten()
            .map(|bio| bio.biomass(species))
            .sum()
    }

    /// Abundance of one species summed over every water tile.
    pub fn total_abundance(&self, species: &Species) -> Array2<f64> {
        let mut total = Array2::zeros(species.shape());
        for bio in self.biology.iter().flatten() {
            if let Some(mat) = bio.abundance(species.index()) {
                if mat.dim() == total.dim() {
                    total += mat;
                }
            }
        }
        total
    }
}
