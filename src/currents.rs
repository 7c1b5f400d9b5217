use crate::ocean::{Cell, Vector2};
use anyhow::{Result, bail};

/// Ocean currents, as a displacement in grid units per step.
pub trait CurrentVectors {
    fn vector(&self, step: u32, cell: Cell) -> Vector2;
}

/// Same current everywhere, every step.
#[derive(Debug, Clone, Copy)]
pub struct UniformCurrent(pub Vector2);

impl CurrentVectors for UniformCurrent {
    fn vector(&self, _step: u32, _cell: Cell) -> Vector2 {
        self.0
    }
}

/// Sequence of gridded current fields, cycled over steps.
///
/// Field `i` is used at every step `s` with `s % n_fields == i`.
#[derive(Debug, Clone)]
pub struct GriddedCurrents {
    width: usize,
    height: usize,
    fields: Vec<Vec<Vector2>>,
}

impl GriddedCurrents {
    /// Build from fields stored row by row (`[y][x]`).
    pub fn new(width: usize, height: usize, fields: Vec<Vec<Vec<Vector2>>>) -> Result<Self> {
        if fields.is_empty() {
            bail!("gridded currents need at least one field");
        }
        let mut flat = Vec::with_capacity(fields.len());
        for (i_field, field) in fields.into_iter().enumerate() {
            if field.len() != height || field.iter().any(|row| row.len() != width) {
                bail!("current field {i_field} must be {height} rows of {width} vectors");
            }
            flat.push(field.into_iter().flatten().collect());
        }
        Ok(Self {
            width,
            height,
            fields: flat,
        })
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }
}

impl CurrentVectors for GriddedCurrents {
    fn vector(&self, step: u32, cell: Cell) -> Vector2 {
        if cell.x >= self.width || cell.y >= self.height {
            return Vector2::default();
        }
        let field = &self.fields[step as usize % self.fields.len()];
        field[cell.y * self.width + cell.x]
    }
}
