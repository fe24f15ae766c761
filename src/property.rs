//! The closed property table of a scene component.
//!
//! Every animatable/settable component property has a fixed small index into
//! a 28-slot table: 24 interpolated "paint" properties (geometry, alpha,
//! rotation, border widths/colors, corner colors) followed by 4 discrete
//! flags. The bulk-settings dispatcher, the transition slots and the
//! animation actions all address properties through this enum rather than by
//! string at every call site.

use crate::color;

/// Number of paint (interpolated) properties; these occupy indices `0..24`.
pub const PAINT_PROPERTIES: usize = 24;

/// Total number of indexed properties, flags included.
pub const PROPERTIES: usize = 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Property {
    X = 0,
    Y = 1,
    W = 2,
    H = 3,
    ScaleX = 4,
    ScaleY = 5,
    PivotX = 6,
    PivotY = 7,
    MountX = 8,
    MountY = 9,
    Alpha = 10,
    Rotation = 11,
    BorderWidthTop = 12,
    BorderWidthBottom = 13,
    BorderWidthLeft = 14,
    BorderWidthRight = 15,
    BorderColorTop = 16,
    BorderColorBottom = 17,
    BorderColorLeft = 18,
    BorderColorRight = 19,
    ColorTopLeft = 20,
    ColorTopRight = 21,
    ColorBottomLeft = 22,
    ColorBottomRight = 23,
    Visible = 24,
    ZIndex = 25,
    ForceZIndexContext = 26,
    Clipping = 27,
}

/// How a property's value interpolates (or doesn't).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropKind {
    /// Plain numeric linear interpolation.
    Number,
    /// Packed ARGB, interpolated per channel.
    Color,
    /// Non-interpolated flag; cannot carry a transition.
    Discrete,
}

pub const ALL: [Property; PROPERTIES] = [
    Property::X,
    Property::Y,
    Property::W,
    Property::H,
    Property::ScaleX,
    Property::ScaleY,
    Property::PivotX,
    Property::PivotY,
    Property::MountX,
    Property::MountY,
    Property::Alpha,
    Property::Rotation,
    Property::BorderWidthTop,
    Property::BorderWidthBottom,
    Property::BorderWidthLeft,
    Property::BorderWidthRight,
    Property::BorderColorTop,
    Property::BorderColorBottom,
    Property::BorderColorLeft,
    Property::BorderColorRight,
    Property::ColorTopLeft,
    Property::ColorTopRight,
    Property::ColorBottomLeft,
    Property::ColorBottomRight,
    Property::Visible,
    Property::ZIndex,
    Property::ForceZIndexContext,
    Property::Clipping,
];

impl Property {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_paint(self) -> bool {
        self.index() < PAINT_PROPERTIES
    }

    pub fn kind(self) -> PropKind {
        match self {
            Property::BorderColorTop
            | Property::BorderColorBottom
            | Property::BorderColorLeft
            | Property::BorderColorRight
            | Property::ColorTopLeft
            | Property::ColorTopRight
            | Property::ColorBottomLeft
            | Property::ColorBottomRight => PropKind::Color,
            Property::Visible
            | Property::ZIndex
            | Property::ForceZIndexContext
            | Property::Clipping => PropKind::Discrete,
            _ => PropKind::Number,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Property::X => "x",
            Property::Y => "y",
            Property::W => "w",
            Property::H => "h",
            Property::ScaleX => "scaleX",
            Property::ScaleY => "scaleY",
            Property::PivotX => "pivotX",
            Property::PivotY => "pivotY",
            Property::MountX => "mountX",
            Property::MountY => "mountY",
            Property::Alpha => "alpha",
            Property::Rotation => "rotation",
            Property::BorderWidthTop => "borderWidthTop",
            Property::BorderWidthBottom => "borderWidthBottom",
            Property::BorderWidthLeft => "borderWidthLeft",
            Property::BorderWidthRight => "borderWidthRight",
            Property::BorderColorTop => "borderColorTop",
            Property::BorderColorBottom => "borderColorBottom",
            Property::BorderColorLeft => "borderColorLeft",
            Property::BorderColorRight => "borderColorRight",
            Property::ColorTopLeft => "colorTopLeft",
            Property::ColorTopRight => "colorTopRight",
            Property::ColorBottomLeft => "colorBottomLeft",
            Property::ColorBottomRight => "colorBottomRight",
            Property::Visible => "visible",
            Property::ZIndex => "zIndex",
            Property::ForceZIndexContext => "forceZIndexContext",
            Property::Clipping => "clipping",
        }
    }

    /// Looks up a property by its settings name ("x", "colorTopLeft", ...).
    pub fn from_name(name: &str) -> Option<Property> {
        ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Looks up an immediate ("final") setter name; these are the UPPERCASE
    /// forms of the regular names and bypass any bound transition.
    pub fn from_final_name(name: &str) -> Option<Property> {
        ALL.iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name) && name.chars().all(|c| !c.is_lowercase()))
    }

    /// Expands an aliased settings key ("scale", "color", "borderWidth",
    /// "colorTop", ...) into the properties it covers.
    pub fn alias(name: &str) -> Option<&'static [Property]> {
        match name {
            "scale" => Some(&[Property::ScaleX, Property::ScaleY]),
            "borderWidth" => Some(&[
                Property::BorderWidthTop,
                Property::BorderWidthBottom,
                Property::BorderWidthLeft,
                Property::BorderWidthRight,
            ]),
            "borderColor" => Some(&[
                Property::BorderColorTop,
                Property::BorderColorBottom,
                Property::BorderColorLeft,
                Property::BorderColorRight,
            ]),
            "color" => Some(&[
                Property::ColorTopLeft,
                Property::ColorTopRight,
                Property::ColorBottomLeft,
                Property::ColorBottomRight,
            ]),
            "colorTop" => Some(&[Property::ColorTopLeft, Property::ColorTopRight]),
            "colorBottom" => Some(&[Property::ColorBottomLeft, Property::ColorBottomRight]),
            "colorLeft" => Some(&[Property::ColorTopLeft, Property::ColorBottomLeft]),
            "colorRight" => Some(&[Property::ColorTopRight, Property::ColorBottomRight]),
            _ => None,
        }
    }

    /// Default value of a paint property, in slot representation.
    pub fn default_value(self) -> f64 {
        match self {
            Property::ScaleX | Property::ScaleY | Property::Alpha => 1.0,
            Property::PivotX | Property::PivotY => 0.5,
            p if p.kind() == PropKind::Color => color::to_slot(color::WHITE),
            _ => 0.0,
        }
    }

    /// Merges `start` toward `target` by eased progress `t`, honoring the
    /// property's interpolation kind. Discrete properties hold `start` until
    /// `t` reaches 1.
    pub fn merge(self, start: f64, target: f64, t: f64) -> f64 {
        match self.kind() {
            PropKind::Number => start + (target - start) * t,
            PropKind::Color => {
                color::to_slot(color::merge_colors(
                    color::from_slot(start),
                    color::from_slot(target),
                    t,
                ))
            }
            PropKind::Discrete => {
                if t >= 1.0 {
                    target
                } else {
                    start
                }
            }
        }
    }
}

/// A typed property value as seen by callers. Internally every property is
/// stored in a numeric slot; [`PropValue::to_slot`] performs the narrowing
/// and [`PropValue::from_slot`] restores the caller-facing type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropValue {
    Number(f64),
    Color(u32),
    Bool(bool),
    Int(i64),
}

impl PropValue {
    /// Converts to the slot encoding for `property`. Numbers are accepted
    /// for any kind so JSON input stays permissive.
    pub fn to_slot(self, property: Property) -> f64 {
        let raw = match self {
            PropValue::Number(v) => v,
            PropValue::Color(c) => color::to_slot(c),
            PropValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            PropValue::Int(i) => i as f64,
        };
        match property.kind() {
            PropKind::Color => match self {
                PropValue::Color(_) => raw,
                // Numeric input for a color is already packed ARGB.
                _ => color::to_slot(raw as u32),
            },
            _ => raw,
        }
    }

    /// Reconstructs the caller-facing value from a slot.
    pub fn from_slot(property: Property, slot: f64) -> Self {
        match property.kind() {
            PropKind::Color => PropValue::Color(color::from_slot(slot)),
            PropKind::Discrete => match property {
                Property::ZIndex => PropValue::Int(slot as i64),
                _ => PropValue::Bool(slot != 0.0),
            },
            PropKind::Number => PropValue::Number(slot),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            PropValue::Number(v) => v,
            PropValue::Color(c) => c as f64,
            PropValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            PropValue::Int(i) => i as f64,
        }
    }
}
