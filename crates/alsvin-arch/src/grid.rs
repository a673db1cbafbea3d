//! The site-grid description used by the exact (SMT) solver variant.
//!
//! The grid file is a CSV with an `x,y` header followed by one row of
//! integer coordinates per site.

use crate::error::{ArchError, ArchResult};

/// A flat enumeration of all trap sites of an architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteGrid {
    sites: Vec<(i64, i64)>,
}

impl SiteGrid {
    /// Parse the `x,y` CSV format.
    pub fn from_csv(input: &str) -> ArchResult<Self> {
        let mut lines = input.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| ArchError::InvalidArchitecture("empty grid file".into()))?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        if columns != ["x", "y"] {
            return Err(ArchError::InvalidArchitecture(format!(
                "grid header must be 'x,y', got '{header}'"
            )));
        }
        let mut sites = Vec::new();
        for (number, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 2 {
                return Err(ArchError::InvalidArchitecture(format!(
                    "grid line {} must have two fields",
                    number + 2
                )));
            }
            let x = fields[0].parse::<i64>().map_err(|_| {
                ArchError::InvalidArchitecture(format!("invalid x on grid line {}", number + 2))
            })?;
            let y = fields[1].parse::<i64>().map_err(|_| {
                ArchError::InvalidArchitecture(format!("invalid y on grid line {}", number + 2))
            })?;
            sites.push((x, y));
        }
        if sites.is_empty() {
            return Err(ArchError::InvalidArchitecture(
                "grid enumerates no sites".into(),
            ));
        }
        Ok(SiteGrid { sites })
    }

    /// All sites in file order.
    #[inline]
    pub fn sites(&self) -> &[(i64, i64)] {
        &self.sites
    }

    /// Distinct x coordinates, ascending.
    pub fn xs(&self) -> Vec<i64> {
        let mut xs: Vec<i64> = self.sites.iter().map(|&(x, _)| x).collect();
        xs.sort_unstable();
        xs.dedup();
        xs
    }

    /// Distinct y coordinates, ascending.
    pub fn ys(&self) -> Vec<i64> {
        let mut ys: Vec<i64> = self.sites.iter().map(|&(_, y)| y).collect();
        ys.sort_unstable();
        ys.dedup();
        ys
    }

    /// Greatest discrete x index (number of distinct columns minus one).
    pub fn max_x(&self) -> u32 {
        self.xs().len() as u32 - 1
    }

    /// Greatest discrete y index (number of distinct rows minus one).
    pub fn max_y(&self) -> u32 {
        self.ys().len() as u32 - 1
    }
}
