//! Item handles and the closed set of item kinds.
//!
//! An [`ItemHandle`] is opaque: it only means something to the engine session
//! that produced it. A [`TypedItem`] is a handle that has been classified and
//! converted to a concrete kind, and can only be obtained through the
//! registry in [`crate::item_type`].

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Opaque handle to one object in the scene hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemHandle(pub u64);

impl fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The recognized item kinds.
///
/// Adding a kind means adding a variant here and an entry in [`ItemKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ItemKind {
    PointSet,
    Region,
    Volume,
    Camera,
    Light,
    Frame,
    Group,
    ReferenceFrame,
    MeasurementPoints,
    ClippingPlane,
}

impl ItemKind {
    /// Every kind, in classification order.
    pub const ALL: [ItemKind; 10] = [
        ItemKind::PointSet,
        ItemKind::Region,
        ItemKind::Volume,
        ItemKind::Camera,
        ItemKind::Light,
        ItemKind::Frame,
        ItemKind::Group,
        ItemKind::ReferenceFrame,
        ItemKind::MeasurementPoints,
        ItemKind::ClippingPlane,
    ];

    /// Canonical name of this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            ItemKind::PointSet => "PointSet",
            ItemKind::Region => "Region",
            ItemKind::Volume => "Volume",
            ItemKind::Camera => "Camera",
            ItemKind::Light => "Light",
            ItemKind::Frame => "Frame",
            ItemKind::Group => "Group",
            ItemKind::ReferenceFrame => "ReferenceFrame",
            ItemKind::MeasurementPoints => "MeasurementPoints",
            ItemKind::ClippingPlane => "ClippingPlane",
        }
    }

    /// Whether items of this kind own children.
    pub fn is_container(&self) -> bool {
        matches!(self, ItemKind::Group)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    /// Accepts canonical names and the engine's legacy names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "pointset" | "spots" => ItemKind::PointSet,
            "region" | "surfaces" => ItemKind::Region,
            "volume" | "dataset" => ItemKind::Volume,
            "camera" => ItemKind::Camera,
            "light" | "lightsource" => ItemKind::Light,
            "frame" => ItemKind::Frame,
            "group" | "datacontainer" => ItemKind::Group,
            "referenceframe" | "referenceframes" => ItemKind::ReferenceFrame,
            "measurementpoints" => ItemKind::MeasurementPoints,
            "clippingplane" => ItemKind::ClippingPlane,
            _ => return Err(format!("Unknown item kind: {}", s)),
        };
        Ok(kind)
    }
}

/// A handle that was classified and converted to a concrete kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypedItem {
    kind: ItemKind,
    handle: ItemHandle,
}

impl TypedItem {
    pub(crate) fn new(kind: ItemKind, handle: ItemHandle) -> Self {
        Self { kind, handle }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn handle(&self) -> ItemHandle {
        self.handle
    }

    pub fn is(&self, kind: ItemKind) -> bool {
        self.kind == kind
    }
}

/// One result of an item query.
///
/// `typed` is `None` when the item's kind is not recognized, or when
/// conversion failed under the best-effort policy.
#[derive(Debug, Clone, Serialize)]
pub struct FoundItem {
    pub handle: ItemHandle,
    pub name: String,
    pub visible: bool,
    pub typed: Option<TypedItem>,
}

impl FoundItem {
    /// The resolved kind, if any.
    pub fn kind(&self) -> Option<ItemKind> {
        self.typed.map(|t| t.kind())
    }

    /// Whether the item was resolved to a concrete kind.
    pub fn is_resolved(&self) -> bool {
        self.typed.is_some()
    }

    /// The handle to use for further engine calls (the converted one when available).
    pub fn target(&self) -> ItemHandle {
        self.typed.map(|t| t.handle()).unwrap_or(self.handle)
    }
}
