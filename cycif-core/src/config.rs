//! Viewer configuration, as served by the host page.

use std::collections::HashSet;
use std::f64::consts::PI;
use serde::Deserialize;
use crate::error::{Error, Result};
use crate::tile::branch_of_prefix;
use crate::tile_cache::DEFAULT_CAPACITY;
use crate::transfer::DEFAULT_BINS;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDescriptor {
    /// Short display name, e.g. `"KI67"`.
    pub name: String,
    /// Data-layer column name, e.g. `"KI67_Cytoplasm"`.
    pub full_name: String,
    /// Tile URL prefix of this channel's pyramid.
    pub src: String,
}

impl ChannelDescriptor {
    pub fn branch(&self) -> Option<&str> {
        branch_of_prefix(&self.src)
    }
}

/// Entity record field names in the data layer.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFields {
    pub id_field: String,
    pub x_coordinate: String,
    pub y_coordinate: String,
    pub phenotype_field: String,
}

impl Default for FeatureFields {
    fn default() -> Self {
        Self {
            id_field: "CellID".into(),
            x_coordinate: "X_centroid".into(),
            y_coordinate: "Y_centroid".into(),
            phenotype_field: "phenotype".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Per-plane saturating sum.
    #[default]
    Additive,
    /// Per-plane maximum.
    Max,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    /// Glyph radius range in CSS pixels, `[min, max]`.
    pub radius: [f64; 2],
    /// Overlay canvas backing-store scale.
    pub px_ratio: f64,
    /// Glyph outline width in CSS pixels.
    pub stroke: f64,
    /// Angular domain the gating sectors are spread over, radians.
    pub angle_domain: [f64; 2],
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            radius: [0.0, 15.0],
            px_ratio: 2.0,
            stroke: 2.0,
            angle_domain: [-PI / 2.0, PI * 3.0 / 2.0],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    pub channels: Vec<ChannelDescriptor>,
    /// Tile URL prefix of the label pyramid. Empty or missing means none.
    #[serde(default)]
    pub label_src: Option<String>,
    #[serde(default)]
    pub feature_data: FeatureFields,
    #[serde(default = "default_capacity")]
    pub tile_cache_capacity: usize,
    #[serde(default = "default_bins")]
    pub transfer_bins: usize,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

fn default_capacity() -> usize { DEFAULT_CAPACITY }
fn default_bins() -> usize { DEFAULT_BINS }

impl ViewerConfig {
    /// Parse and validate.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Branch segment of the label pyramid, if one is configured.
    pub fn label_branch(&self) -> Option<&str> {
        self.label_src.as_deref().and_then(branch_of_prefix)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.channels.is_empty() {
            return invalid("no channels configured".into());
        }
        if self.tile_cache_capacity == 0 {
            return invalid("tileCacheCapacity must be at least 1".into());
        }
        if self.transfer_bins < 2 {
            return invalid(format!("transferBins must be at least 2, got {}", self.transfer_bins));
        }
        let mut seen = HashSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.full_name.as_str()) {
                return invalid(format!("duplicate channel {}", ch.full_name));
            }
            if ch.branch().is_none() {
                return invalid(format!("channel {} has no tile path", ch.full_name));
            }
        }
        let [r_min, r_max] = self.overlay.radius;
        if !(r_min <= r_max) {
            return invalid(format!("overlay radius range [{r_min}, {r_max}] is inverted"));
        }
        if !(self.overlay.px_ratio > 0.0) {
            return invalid("overlay pxRatio must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "channels": [
            { "name": "DNA", "fullName": "DNA_1", "src": "/tiles/DNA_1_files/" },
            { "name": "KI67", "fullName": "KI67_Cyto", "src": "/tiles/KI67_files" }
        ]
    }"#;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.tile_cache_capacity, 150);
        assert_eq!(config.transfer_bins, 1024);
        assert_eq!(config.blend, BlendMode::Additive);
        assert_eq!(config.overlay.radius, [0.0, 15.0]);
        assert_eq!(config.overlay.px_ratio, 2.0);
        assert_eq!(config.feature_data.x_coordinate, "X_centroid");
        assert_eq!(config.label_branch(), None);
        assert_eq!(config.channels[1].branch(), Some("KI67_files"));
    }

    #[test]
    fn test_full_config() {
        let text = r#"{
            "channels": [{ "name": "DNA", "fullName": "DNA_1", "src": "/t/DNA/" }],
            "labelSrc": "/t/cellMask_files/",
            "featureData": { "idField": "id", "xCoordinate": "X", "yCoordinate": "Y" },
            "tileCacheCapacity": 300,
            "transferBins": 256,
            "blend": "max",
            "overlay": { "radius": [2, 20], "pxRatio": 1 }
        }"#;
        let config = ViewerConfig::from_json(text).unwrap();
        assert_eq!(config.label_branch(), Some("cellMask_files"));
        assert_eq!(config.feature_data.id_field, "id");
        assert_eq!(config.feature_data.phenotype_field, "phenotype");
        assert_eq!(config.blend, BlendMode::Max);
        assert_eq!(config.overlay.radius, [2.0, 20.0]);
        assert_eq!(config.overlay.stroke, 2.0);
    }

    #[test]
    fn test_empty_label_src_means_no_label() {
        let text = r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "/A/" }], "labelSrc": "" }"#;
        assert_eq!(ViewerConfig::from_json(text).unwrap().label_branch(), None);
    }

    #[test]
    fn test_rejects_bad_configs() {
        let cases = [
            r#"{ "channels": [] }"#,
            r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "/A/" }], "transferBins": 1 }"#,
            r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "/A/" }], "tileCacheCapacity": 0 }"#,
            r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "///" }] }"#,
            r#"{ "channels": [
                { "name": "a", "fullName": "A", "src": "/A/" },
                { "name": "b", "fullName": "A", "src": "/B/" }
            ] }"#,
            r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "/A/" }], "overlay": { "radius": [5, 1] } }"#,
            r#"{ "channels": [{ "name": "a", "fullName": "A", "src": "/A/" }], "overlay": { "pxRatio": 0 } }"#,
        ];
        for text in cases {
            assert!(
                matches!(ViewerConfig::from_json(text), Err(Error::InvalidConfig(_))),
                "accepted: {text}"
            );
        }
        assert!(matches!(ViewerConfig::from_json("{"), Err(Error::ConfigParse(_))));
    }
}
