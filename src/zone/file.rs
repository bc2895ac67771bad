use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use super::{Point, Zone, ZoneList, DEFAULT_ZONE_COLORS};
use crate::frame::Rgb;

/// On-disk zone description. Points are in the file's image coordinates.
///
/// ```json
/// {
///   "image_width": 1920,
///   "image_height": 1080,
///   "zones": [
///     { "name": "entrance", "points": [[0, 0], [960, 0], [960, 1080], [0, 1080]] }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ZoneFile {
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneEntry {
    pub name: String,
    pub points: Vec<[f32; 2]>,
    #[serde(default)]
    pub color: Option<Rgb>,
}

impl ZoneFile {
    pub fn into_zone_list(self) -> Result<ZoneList> {
        let zones = self
            .zones
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let color = entry
                    .color
                    .unwrap_or(DEFAULT_ZONE_COLORS[i % DEFAULT_ZONE_COLORS.len()]);
                let boundary = entry
                    .points
                    .iter()
                    .map(|[x, y]| Point::new(*x, *y))
                    .collect();
                Zone::new(&entry.name, boundary, color)
            })
            .collect::<Result<Vec<_>>>()?;
        ZoneList::new(zones, self.image_width, self.image_height)
    }
}

impl ZoneList {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: ZoneFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid zone file: {}", e))?;
        file.into_zone_list()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read zone file {}: {}", path.display(), e))?;
        Self::from_json_str(&raw).map_err(|e| anyhow!("{}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zones_with_default_colors() -> Result<()> {
        let zones = ZoneList::from_json_str(
            r#"{
                "image_width": 1280,
                "image_height": 720,
                "zones": [
                    {"name": "door", "points": [[0, 0], [100, 0], [100, 100]]},
                    {"name": "desk", "points": [[200, 0], [300, 0], [300, 100]]},
                    {"name": "bar", "points": [[400, 0], [500, 0], [500, 100]], "color": [9, 9, 9]}
                ]
            }"#,
        )?;
        let colors: Vec<Rgb> = zones.zones().iter().map(Zone::color).collect();
        assert_eq!(colors, vec![[0, 255, 0], [0, 0, 255], [9, 9, 9]]);
        assert_eq!(zones.image_size(), (1280, 720));
        Ok(())
    }

    #[test]
    fn reports_path_on_read_failure() {
        let err = ZoneList::from_file(Path::new("/nonexistent/zones.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/zones.json"));
    }
}
