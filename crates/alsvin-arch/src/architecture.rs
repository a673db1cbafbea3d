//! The architecture model: zones, geometry, and site queries.

use serde::Deserialize;

use crate::error::{ArchError, ArchResult};
use crate::slm::{Aod, Rect, Site, Slm, SlmId, ZoneRole};

#[derive(Debug, Deserialize)]
struct SlmRecord {
    id: SlmId,
    site_separation: serde_json::Value,
    r: usize,
    c: usize,
    location: (i64, i64),
}

#[derive(Debug, Deserialize)]
struct ZoneRecord {
    zone_id: u32,
    slms: Vec<SlmRecord>,
    #[allow(dead_code)]
    #[serde(default)]
    offset: Option<(i64, i64)>,
    #[allow(dead_code)]
    #[serde(default)]
    dimension: Option<(i64, i64)>,
}

#[derive(Debug, Deserialize)]
struct AodRecord {
    id: u32,
    site_separation: i64,
    r: usize,
    c: usize,
}

#[derive(Debug, Deserialize)]
struct ArchitectureRecord {
    #[serde(default)]
    name: String,
    storage_zones: Vec<ZoneRecord>,
    entanglement_zones: Vec<ZoneRecord>,
    aods: Vec<AodRecord>,
    #[serde(default)]
    rydberg_range: Vec<((i64, i64), (i64, i64))>,
    #[serde(default = "default_rydberg_radius")]
    rydberg_radius: i64,
    #[serde(default = "default_min_atom_distance")]
    min_atom_distance: i64,
    #[serde(default = "default_no_interaction_radius")]
    no_interaction_radius: i64,
}

fn default_rydberg_radius() -> i64 {
    2
}

fn default_min_atom_distance() -> i64 {
    1
}

fn default_no_interaction_radius() -> i64 {
    5
}

/// Immutable description of the trap lattice.
///
/// Built once from JSON, then shared by reference through the whole
/// pipeline.
#[derive(Debug, Clone)]
pub struct Architecture {
    /// Architecture name.
    pub name: String,
    slms: Vec<Slm>,
    /// SLMs of the storage zones, in file order.
    pub storage_zones: Vec<SlmId>,
    /// Entanglement zones as bound SLM pairs sharing cell coordinates.
    pub entanglement_zones: Vec<[SlmId; 2]>,
    /// AOD descriptors.
    pub aods: Vec<Aod>,
    /// Rydberg illumination rectangles.
    pub rydberg_ranges: Vec<Rect>,
    /// Radius within which a Rydberg pulse entangles two atoms.
    pub rydberg_radius: i64,
    /// Minimum distance between any two trapped atoms.
    pub min_atom_distance: i64,
    /// Radius below which parked atoms would still disturb each other.
    pub no_interaction_radius: i64,
}

fn parse_separation(value: &serde_json::Value) -> ArchResult<(i64, i64)> {
    match value {
        serde_json::Value::Number(n) => {
            let s = n.as_i64().ok_or_else(|| {
                ArchError::InvalidArchitecture("site_separation must be an integer".into())
            })?;
            Ok((s, s))
        }
        serde_json::Value::Array(items) if items.len() == 2 => {
            let dx = items[0].as_i64();
            let dy = items[1].as_i64();
            match (dx, dy) {
                (Some(dx), Some(dy)) => Ok((dx, dy)),
                _ => Err(ArchError::InvalidArchitecture(
                    "site_separation entries must be integers".into(),
                )),
            }
        }
        _ => Err(ArchError::InvalidArchitecture(
            "site_separation must be an integer or a pair".into(),
        )),
    }
}

impl Architecture {
    /// Parse an architecture from its JSON description.
    pub fn from_json(input: &str) -> ArchResult<Self> {
        let record: ArchitectureRecord = serde_json::from_str(input)
            .map_err(|e| ArchError::InvalidArchitecture(format!("malformed JSON: {e}")))?;
        let mut slms: Vec<Slm> = Vec::new();
        let mut storage_zones = Vec::new();
        let mut entanglement_zones = Vec::new();
        for zone in &record.storage_zones {
            for slm in &zone.slms {
                storage_zones.push(slm.id);
                slms.push(Slm {
                    id: slm.id,
                    rows: slm.r,
                    cols: slm.c,
                    location: slm.location,
                    site_separation: parse_separation(&slm.site_separation)?,
                    role: ZoneRole::Storage { zone: zone.zone_id },
                });
            }
        }
        for zone in &record.entanglement_zones {
            if zone.slms.len() % 2 != 0 {
                return Err(ArchError::InvalidArchitecture(format!(
                    "entanglement zone {} must pair its SLMs two-by-two",
                    zone.zone_id
                )));
            }
            for pair in zone.slms.chunks(2) {
                if pair[0].r != pair[1].r || pair[0].c != pair[1].c {
                    return Err(ArchError::InvalidArchitecture(format!(
                        "entanglement pair ({}, {}) must share cell dimensions",
                        pair[0].id, pair[1].id
                    )));
                }
                entanglement_zones.push([pair[0].id, pair[1].id]);
                for (side, slm) in pair.iter().enumerate() {
                    slms.push(Slm {
                        id: slm.id,
                        rows: slm.r,
                        cols: slm.c,
                        location: slm.location,
                        site_separation: parse_separation(&slm.site_separation)?,
                        role: ZoneRole::Entanglement {
                            zone: zone.zone_id,
                            side: side as u8,
                        },
                    });
                }
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for slm in &slms {
            if !seen.insert(slm.id) {
                return Err(ArchError::InvalidArchitecture(format!(
                    "duplicate SLM id {}",
                    slm.id
                )));
            }
        }
        if storage_zones.is_empty() {
            return Err(ArchError::InvalidArchitecture(
                "at least one storage zone is required".into(),
            ));
        }
        if entanglement_zones.is_empty() {
            return Err(ArchError::InvalidArchitecture(
                "at least one entanglement zone is required".into(),
            ));
        }
        if record.aods.is_empty() {
            return Err(ArchError::InvalidArchitecture(
                "at least one AOD is required".into(),
            ));
        }
        Ok(Architecture {
            name: record.name,
            slms,
            storage_zones,
            entanglement_zones,
            aods: record
                .aods
                .into_iter()
                .map(|a| Aod {
                    id: a.id,
                    site_separation: a.site_separation,
                    rows: a.r,
                    cols: a.c,
                })
                .collect(),
            rydberg_ranges: record
                .rydberg_range
                .into_iter()
                .map(|(min, max)| Rect { min, max })
                .collect(),
            rydberg_radius: record.rydberg_radius,
            min_atom_distance: record.min_atom_distance,
            no_interaction_radius: record.no_interaction_radius,
        })
    }

    /// The SLM with the given id.
    pub fn slm(&self, id: SlmId) -> ArchResult<&Slm> {
        self.slms
            .iter()
            .find(|s| s.id == id)
            .ok_or(ArchError::UnknownSlm(id))
    }

    /// All SLMs.
    #[inline]
    pub fn slms(&self) -> &[Slm] {
        &self.slms
    }

    /// Exact coordinates of a site.
    pub fn exact_location(&self, site: Site) -> ArchResult<(i64, i64)> {
        Ok(self
            .slm(site.slm)?
            .site_location(site.row as usize, site.col as usize))
    }

    /// Squared Euclidean distance between two sites.
    pub fn distance(&self, a: Site, b: Site) -> ArchResult<f64> {
        let (ax, ay) = self.exact_location(a)?;
        let (bx, by) = self.exact_location(b)?;
        let dx = (ax - bx) as f64;
        let dy = (ay - by) as f64;
        Ok(dx * dx + dy * dy)
    }

    /// The nearest storage site to the given site, by geometry only.
    pub fn nearest_storage_site(&self, site: Site) -> ArchResult<Site> {
        let (x, y) = self.exact_location(site)?;
        let mut best: Option<(f64, Site)> = None;
        for &id in &self.storage_zones {
            let slm = self.slm(id)?;
            for r in 0..slm.rows {
                for c in 0..slm.cols {
                    let (sx, sy) = slm.site_location(r, c);
                    let dx = (sx - x) as f64;
                    let dy = (sy - y) as f64;
                    let d = dx * dx + dy * dy;
                    if best.is_none_or(|(bd, _)| d < bd) {
                        best = Some((d, Site::new(id, r, c)));
                    }
                }
            }
        }
        best.map(|(_, s)| s)
            .ok_or(ArchError::NoSuchSite("storage"))
    }

    /// The entanglement pair site (first side) whose pair midpoint is
    /// nearest to the midpoint of the two given sites.
    pub fn nearest_entanglement_site(&self, a: Site, b: Site) -> ArchResult<Site> {
        let (ax, ay) = self.exact_location(a)?;
        let (bx, by) = self.exact_location(b)?;
        let mid = ((ax + bx) as f64 / 2.0, (ay + by) as f64 / 2.0);
        let mut best: Option<(f64, Site)> = None;
        for pair in &self.entanglement_zones {
            let left = self.slm(pair[0])?;
            let right = self.slm(pair[1])?;
            for r in 0..left.rows {
                for c in 0..left.cols {
                    let (lx, ly) = left.site_location(r, c);
                    let (rx, ry) = right.site_location(r, c);
                    let cell = ((lx + rx) as f64 / 2.0, (ly + ry) as f64 / 2.0);
                    let dx = cell.0 - mid.0;
                    let dy = cell.1 - mid.1;
                    let d = dx * dx + dy * dy;
                    if best.is_none_or(|(bd, _)| d < bd) {
                        best = Some((d, Site::new(pair[0], r, c)));
                    }
                }
            }
        }
        best.map(|(_, s)| s)
            .ok_or(ArchError::NoSuchSite("entanglement"))
    }

    /// The partner site on the other side of an entanglement pair.
    pub fn other_entanglement_site(&self, site: Site) -> ArchResult<Site> {
        for pair in &self.entanglement_zones {
            if pair[0] == site.slm {
                return Ok(Site {
                    slm: pair[1],
                    ..site
                });
            }
            if pair[1] == site.slm {
                return Ok(Site {
                    slm: pair[0],
                    ..site
                });
            }
        }
        Err(ArchError::NotAnEntanglementSite)
    }

    /// Whether the site belongs to a storage zone.
    pub fn is_storage_site(&self, site: Site) -> ArchResult<bool> {
        Ok(self.slm(site.slm)?.is_storage())
    }

    /// Whether the site belongs to an entanglement zone.
    pub fn is_entanglement_site(&self, site: Site) -> ArchResult<bool> {
        Ok(self.slm(site.slm)?.is_entanglement())
    }

    /// The bounding box of every site of the architecture.
    pub fn extent(&self) -> Rect {
        let mut min = (i64::MAX, i64::MAX);
        let mut max = (i64::MIN, i64::MIN);
        for slm in &self.slms {
            for &(x, y) in &[
                slm.site_location(0, 0),
                slm.site_location(slm.rows - 1, slm.cols - 1),
            ] {
                min.0 = min.0.min(x);
                min.1 = min.1.min(y);
                max.0 = max.0.max(x);
                max.1 = max.1.max(y);
            }
        }
        Rect { min, max }
    }

    /// Total number of storage sites.
    pub fn num_storage_sites(&self) -> usize {
        self.storage_zones
            .iter()
            .map(|&id| {
                let slm = self.slm(id).expect("zone lists only known SLMs");
                slm.rows * slm.cols
            })
            .sum()
    }

    /// Number of entanglement pair sites (pairs count once).
    pub fn num_entanglement_sites(&self) -> usize {
        self.entanglement_zones
            .iter()
            .map(|pair| {
                let slm = self.slm(pair[0]).expect("zone lists only known SLMs");
                slm.rows * slm.cols
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Storage 20×20 below, one 4×4 entanglement zone above.
    pub(crate) const TEST_ARCH: &str = r#"{
        "name": "test_architecture",
        "storage_zones": [{
            "zone_id": 0,
            "slms": [{"id": 0, "site_separation": [3, 3], "r": 20, "c": 20, "location": [0, 0]}],
            "offset": [0, 0],
            "dimension": [60, 60]
        }],
        "entanglement_zones": [{
            "zone_id": 0,
            "slms": [
                {"id": 1, "site_separation": [12, 10], "r": 4, "c": 4, "location": [5, 70]},
                {"id": 2, "site_separation": [12, 10], "r": 4, "c": 4, "location": [7, 70]}
            ],
            "offset": [5, 70],
            "dimension": [50, 40]
        }],
        "aods": [{"id": 0, "site_separation": 2, "r": 20, "c": 20}],
        "rydberg_range": [[[5, 70], [55, 110]]]
    }"#;

    #[test]
    fn parse_and_query_geometry() {
        let arch = Architecture::from_json(TEST_ARCH).unwrap();
        assert_eq!(arch.name, "test_architecture");
        assert_eq!(arch.storage_zones.len(), 1);
        assert_eq!(arch.entanglement_zones.len(), 1);
        assert_eq!(arch.num_storage_sites(), 400);
        assert_eq!(arch.num_entanglement_sites(), 16);
        assert_eq!(arch.exact_location(Site::new(0, 2, 1)).unwrap(), (3, 6));
        assert_eq!(arch.exact_location(Site::new(1, 1, 2)).unwrap(), (29, 80));
        assert_eq!(arch.exact_location(Site::new(2, 0, 0)).unwrap(), (7, 70));
    }

    #[test]
    fn distances_are_squared_euclidean() {
        let arch = Architecture::from_json(TEST_ARCH).unwrap();
        let d = arch
            .distance(Site::new(0, 0, 0), Site::new(0, 1, 1))
            .unwrap();
        assert_eq!(d, 18.0);
    }

    #[test]
    fn nearest_storage_site_is_geometrically_closest() {
        let arch = Architecture::from_json(TEST_ARCH).unwrap();
        // the left entanglement site (5, 70) is closest to storage (6, 57)
        let nearest = arch.nearest_storage_site(Site::new(1, 0, 0)).unwrap();
        assert_eq!(nearest, Site::new(0, 19, 2));
    }

    #[test]
    fn other_entanglement_site_flips_the_pair() {
        let arch = Architecture::from_json(TEST_ARCH).unwrap();
        let site = Site::new(1, 2, 3);
        let other = arch.other_entanglement_site(site).unwrap();
        assert_eq!(other, Site::new(2, 2, 3));
        assert_eq!(arch.other_entanglement_site(other).unwrap(), site);
        assert!(arch.other_entanglement_site(Site::new(0, 0, 0)).is_err());
    }

    #[test]
    fn nearest_entanglement_site_minimizes_midpoint_distance() {
        let arch = Architecture::from_json(TEST_ARCH).unwrap();
        let a = Site::new(0, 19, 0);
        let b = Site::new(0, 19, 1);
        let site = arch.nearest_entanglement_site(a, b).unwrap();
        assert_eq!(site, Site::new(1, 0, 0));
    }

    #[test]
    fn unpaired_entanglement_slms_are_rejected() {
        let bad = r#"{
            "storage_zones": [{"zone_id": 0, "slms": [{"id": 0, "site_separation": 3, "r": 2, "c": 2, "location": [0, 0]}]}],
            "entanglement_zones": [{"zone_id": 0, "slms": [{"id": 1, "site_separation": 3, "r": 2, "c": 2, "location": [0, 20]}]}],
            "aods": [{"id": 0, "site_separation": 2, "r": 2, "c": 2}]
        }"#;
        assert!(matches!(
            Architecture::from_json(bad),
            Err(ArchError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn duplicate_slm_ids_are_rejected() {
        let bad = r#"{
            "storage_zones": [{"zone_id": 0, "slms": [{"id": 0, "site_separation": 3, "r": 2, "c": 2, "location": [0, 0]}]}],
            "entanglement_zones": [{"zone_id": 0, "slms": [
                {"id": 0, "site_separation": 3, "r": 2, "c": 2, "location": [0, 20]},
                {"id": 2, "site_separation": 3, "r": 2, "c": 2, "location": [2, 20]}
            ]}],
            "aods": [{"id": 0, "site_separation": 2, "r": 2, "c": 2}]
        }"#;
        assert!(Architecture::from_json(bad).is_err());
    }
}
