//! Polygonal zones and occupancy accounting.
//!
//! Zones are independent regions: they need not cover the image and may
//! overlap. An object is tested against every zone with the same policy (its
//! box center must fall inside the polygon), so one object can count toward
//! several zones at once.

mod file;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use crate::frame::Rgb;
use crate::lifecycle::LifecycleStore;
use crate::track::{ObjectId, TrackedObject, TrackedObjects};

pub use file::ZoneFile;

/// Default zone colors, cycled in list order when a zone has none.
pub const DEFAULT_ZONE_COLORS: [Rgb; 2] = [[0, 255, 0], [0, 0, 255]];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A named polygon of at least three points.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    name: String,
    boundary: Vec<Point>,
    color: Rgb,
}

impl Zone {
    pub fn new(name: &str, boundary: Vec<Point>, color: Rgb) -> Result<Self> {
        validate_zone_name(name)?;
        if boundary.len() < 3 {
            return Err(anyhow!(
                "zone '{}' needs at least 3 boundary points, got {}",
                name,
                boundary.len()
            ));
        }
        Ok(Self {
            name: name.to_string(),
            boundary,
            color,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn boundary(&self) -> &[Point] {
        &self.boundary
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    /// Axis-aligned rectangular zone.
    pub fn rect(name: &str, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb) -> Result<Self> {
        Self::new(
            name,
            vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
            color,
        )
    }

    /// Even-odd ray casting. A point on a shared vertical edge belongs to the
    /// zone on its right.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        let pts = &self.boundary;
        if pts.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (pi, pj) = (pts[i], pts[j]);
            if (pi.y > y) != (pj.y > y) {
                let x_cross = (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x;
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Zone test primitive used for membership and occupancy.
    pub fn within(&self, object: &TrackedObject) -> bool {
        let (cx, cy) = object.bbox.center();
        self.contains_point(cx, cy)
    }

    fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            name: self.name.clone(),
            boundary: self
                .boundary
                .iter()
                .map(|p| Point::new(p.x * sx, p.y * sy))
                .collect(),
            color: self.color,
        }
    }
}

/// Zone names appear in event labels and topic paths.
pub fn validate_zone_name(name: &str) -> Result<()> {
    static ZONE_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_NAME_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9 _.\-]{1,64}$").expect("zone name pattern is valid")
    });
    if !re.is_match(name) || name.trim().is_empty() {
        return Err(anyhow!(
            "invalid zone name '{}': expected 1-64 of [A-Za-z0-9 _.-]",
            name
        ));
    }
    Ok(())
}

/// A zone change observed for one object during a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneTransition {
    pub id: ObjectId,
    pub zone: String,
}

/// Ordered zones plus the frame dimensions their coordinates refer to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneList {
    zones: Vec<Zone>,
    image_width: u32,
    image_height: u32,
}

impl ZoneList {
    pub fn new(zones: Vec<Zone>, image_width: u32, image_height: u32) -> Result<Self> {
        let mut seen = HashSet::new();
        for zone in &zones {
            if !seen.insert(zone.name.as_str()) {
                return Err(anyhow!("duplicate zone name '{}'", zone.name));
            }
        }
        if image_width == 0 || image_height == 0 {
            return Err(anyhow!(
                "zone image size must be non-zero, got {}x{}",
                image_width,
                image_height
            ));
        }
        Ok(Self {
            zones,
            image_width,
            image_height,
        })
    }

    /// Empty list for deployments without zones.
    pub fn empty(image_width: u32, image_height: u32) -> Self {
        Self {
            zones: Vec::new(),
            image_width,
            image_height,
        }
    }

    /// Rescale every boundary to a `width` x `height` frame.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        if width == self.image_width && height == self.image_height {
            return self.clone();
        }
        let sx = width as f32 / self.image_width as f32;
        let sy = height as f32 / self.image_height as f32;
        Self {
            zones: self.zones.iter().map(|z| z.scaled(sx, sy)).collect(),
            image_width: width,
            image_height: height,
        }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// Names of every zone containing `object`, in list order.
    pub fn membership(&self, object: &TrackedObject) -> Vec<&str> {
        self.zones
            .iter()
            .filter(|z| z.within(object))
            .map(|z| z.name.as_str())
            .collect()
    }

    /// First containing zone in list order.
    pub fn canonical_zone(&self, object: &TrackedObject) -> Option<&Zone> {
        self.zones.iter().find(|z| z.within(object))
    }

    /// Objects per zone. Every zone is present; empty zones report 0.
    pub fn occupancy<'a, I>(&self, objects: I) -> BTreeMap<String, usize>
    where
        I: IntoIterator<Item = &'a TrackedObject>,
    {
        let mut counts: BTreeMap<String, usize> =
            self.zones.iter().map(|z| (z.name.clone(), 0)).collect();
        for object in objects {
            for name in self.membership(object) {
                if let Some(count) = counts.get_mut(name) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Objects whose canonical zone differs from the zone last recorded for them.
    ///
    /// Objects outside every zone keep their recorded zone. Objects without a
    /// lifecycle entry are skipped.
    pub fn transitions(&self, objects: &TrackedObjects, store: &LifecycleStore) -> Vec<ZoneTransition> {
        let mut transitions = Vec::new();
        for (id, object) in objects {
            let Some(entry) = store.get(*id) else {
                continue;
            };
            let Some(zone) = self.canonical_zone(object) else {
                continue;
            };
            if entry.last_zone.as_deref() != Some(zone.name.as_str()) {
                transitions.push(ZoneTransition {
                    id: *id,
                    zone: zone.name.clone(),
                });
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use std::time::UNIX_EPOCH;

    fn object_at(id: ObjectId, cx: f32, cy: f32) -> TrackedObject {
        TrackedObject {
            id,
            bbox: BoundingBox::centered(cx, cy, 20.0, 20.0),
            label: "person".to_string(),
            class_index: 0,
            confidence: 0.9,
        }
    }

    fn halves() -> ZoneList {
        ZoneList::new(
            vec![
                Zone::rect("A", 0.0, 0.0, 320.0, 480.0, [0, 255, 0]).unwrap(),
                Zone::rect("B", 320.0, 0.0, 640.0, 480.0, [0, 0, 255]).unwrap(),
            ],
            640,
            480,
        )
        .unwrap()
    }

    #[test]
    fn occupancy_reports_every_zone_including_empty() {
        let zones = halves();
        let objects = [object_at(0, 100.0, 240.0)];
        let occupancy = zones.occupancy(objects.iter());
        assert_eq!(occupancy["A"], 1);
        assert_eq!(occupancy["B"], 0);
    }

    #[test]
    fn overlapping_zones_both_count_the_object() {
        let zones = ZoneList::new(
            vec![
                Zone::rect("C", 0.0, 0.0, 100.0, 100.0, [0, 255, 0]).unwrap(),
                Zone::rect("D", 25.0, 25.0, 75.0, 75.0, [0, 0, 255]).unwrap(),
            ],
            640,
            480,
        )
        .unwrap();
        let object = object_at(0, 50.0, 50.0);
        assert_eq!(zones.membership(&object), vec!["C", "D"]);
        let occupancy = zones.occupancy([&object]);
        assert_eq!(occupancy["C"], 1);
        assert_eq!(occupancy["D"], 1);
    }

    #[test]
    fn shared_edge_belongs_to_zone_on_the_right() {
        let zones = halves();
        assert_eq!(zones.membership(&object_at(0, 320.0, 240.0)), vec!["B"]);
    }

    #[test]
    fn triangle_containment() {
        let zone = Zone::new(
            "tri",
            vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(0.0, 100.0)],
            [255, 0, 0],
        )
        .unwrap();
        assert!(zone.contains_point(10.0, 10.0));
        assert!(!zone.contains_point(80.0, 80.0));
    }

    #[test]
    fn degenerate_boundary_contains_nothing() {
        let empty = Zone {
            name: "empty".to_string(),
            boundary: Vec::new(),
            color: [0, 0, 0],
        };
        assert!(!empty.contains_point(0.0, 0.0));
        assert!(!empty.within(&object_at(0, 0.0, 0.0)));
        let segment = Zone {
            boundary: vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            ..empty
        };
        assert!(!segment.contains_point(5.0, 5.0));
    }

    #[test]
    fn scaling_moves_boundaries_with_frame_size() {
        let zones = halves().scaled_to(1280, 960);
        assert_eq!(zones.image_size(), (1280, 960));
        let b = zones.get("B").unwrap();
        assert_eq!(b.boundary()[0], Point::new(640.0, 0.0));
        assert_eq!(zones.membership(&object_at(0, 700.0, 400.0)), vec!["B"]);
    }

    #[test]
    fn rejects_duplicate_and_malformed_zones() {
        let a = Zone::rect("A", 0.0, 0.0, 1.0, 1.0, [0, 0, 0]).unwrap();
        assert!(ZoneList::new(vec![a.clone(), a], 10, 10).is_err());
        assert!(Zone::rect("bad/name", 0.0, 0.0, 1.0, 1.0, [0, 0, 0]).is_err());
        assert!(Zone::new("line", vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)], [0, 0, 0]).is_err());
    }

    #[test]
    fn transitions_use_first_zone_and_keep_last_zone_outside() {
        let zones = ZoneList::new(
            vec![
                Zone::rect("C", 0.0, 0.0, 100.0, 100.0, [0, 255, 0]).unwrap(),
                Zone::rect("D", 0.0, 0.0, 100.0, 100.0, [0, 0, 255]).unwrap(),
            ],
            640,
            480,
        )
        .unwrap();
        let mut store = LifecycleStore::new();
        store.create(0, UNIX_EPOCH);
        store.create(1, UNIX_EPOCH);
        if let Some(entry) = store.get_mut(1) {
            entry.last_zone = Some("C".to_string());
        }
        let objects: TrackedObjects = [(0, object_at(0, 50.0, 50.0)), (1, object_at(1, 50.0, 50.0))]
            .into_iter()
            .collect();
        let transitions = zones.transitions(&objects, &store);
        assert_eq!(
            transitions,
            vec![ZoneTransition {
                id: 0,
                zone: "C".to_string()
            }]
        );

        let outside: TrackedObjects = [(1, object_at(1, 500.0, 400.0))].into_iter().collect();
        assert!(zones.transitions(&outside, &store).is_empty());
    }
}
