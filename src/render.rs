// src/render.rs
//
// What the rendering surface is told: every known frame as a raster layer,
// with exactly one of them flagged active.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::frames::FrameCatalog;

/// Named selection/style parameters forwarded untouched to the renderer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayerStyle {
    /// Layer name, e.g. "tms_difference"
    pub name: String,
    /// Variable within the resource to draw
    pub variable: String,
    /// Colormap id understood by the renderer
    pub colormap: String,
    pub opacity: f64,
    /// Numeric range mapped onto the colormap
    pub clim: [f64; 2],
    /// Dimension selectors, e.g. `tms_denial_flag = [0, 1]`
    pub selector: BTreeMap<String, Vec<i64>>,
}

impl Default for LayerStyle {
    fn default() -> Self {
        let mut selector = BTreeMap::new();
        selector.insert("tms_denial_flag".to_string(), vec![0, 1]);
        Self {
            name: "tms_difference".to_string(),
            variable: "precip_rate".to_string(),
            colormap: "redteal".to_string(),
            opacity: 0.75,
            clim: [-1.0, 1.0],
            selector,
        }
    }
}

/// One frame as the rendering surface sees it.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RasterLayer {
    pub index: usize,
    /// Opaque resource locator
    pub locator: String,
    pub style: LayerStyle,
    /// Whether this is the visible frame
    pub active: bool,
}

/// Build one layer per cataloged frame. At most one is active: the one
/// matching `active_index`, if it is in the catalog.
pub fn raster_layers(
    catalog: &FrameCatalog,
    style: &LayerStyle,
    active_index: Option<usize>,
) -> Vec<RasterLayer> {
    catalog
        .iter()
        .map(|frame| RasterLayer {
            index: frame.index,
            locator: frame.locator.clone(),
            style: style.clone(),
            active: Some(frame.index) == active_index,
        })
        .collect()
}
