// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::style::{Style, StyleEntry};

/// Closed set of step shapes the form surface can show and author.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Rectangle,
    Rounded,
    Ellipse,
    Rhombus,
    Triangle,
    Parallelogram,
    Hexagon,
    Cylinder,
    Document,
    Process,
    Cloud,
}

struct ShapeSpec {
    shape: Shape,
    name: &'static str,
    /// Leading bare style token (`ellipse;...`).
    base: Option<&'static str>,
    /// Value of the `shape=` key.
    shape_key: Option<&'static str>,
    rounded: bool,
}

impl ShapeSpec {
    const fn new(
        shape: Shape,
        name: &'static str,
        base: Option<&'static str>,
        shape_key: Option<&'static str>,
        rounded: bool,
    ) -> Self {
        Self {
            shape,
            name,
            base,
            shape_key,
            rounded,
        }
    }
}

const SHAPES: &[ShapeSpec] = &[
    ShapeSpec::new(Shape::Rectangle, "rectangle", None, None, false),
    ShapeSpec::new(Shape::Rounded, "rounded", None, None, true),
    ShapeSpec::new(Shape::Ellipse, "ellipse", Some("ellipse"), None, false),
    ShapeSpec::new(Shape::Rhombus, "rhombus", Some("rhombus"), None, false),
    ShapeSpec::new(Shape::Triangle, "triangle", Some("triangle"), None, false),
    ShapeSpec::new(Shape::Parallelogram, "parallelogram", None, Some("parallelogram"), false),
    ShapeSpec::new(Shape::Hexagon, "hexagon", None, Some("hexagon"), false),
    ShapeSpec::new(Shape::Cylinder, "cylinder", None, Some("cylinder3"), false),
    ShapeSpec::new(Shape::Document, "document", None, Some("document"), false),
    ShapeSpec::new(Shape::Process, "process", None, Some("process"), false),
    ShapeSpec::new(Shape::Cloud, "cloud", Some("ellipse"), Some("cloud"), false),
];

/// Additional `shape=` values other editors emit for the same shapes.
const SHAPE_KEY_ALIASES: &[(&str, Shape)] = &[
    ("cylinder", Shape::Cylinder),
    ("mxgraph.flowchart.decision", Shape::Rhombus),
    ("mxgraph.flowchart.terminator", Shape::Rounded),
    ("mxgraph.flowchart.document", Shape::Document),
    ("mxgraph.flowchart.predefined_process", Shape::Process),
];

const VERTEX_STYLE_TAIL: &str = "whiteSpace=wrap;html=1;";

impl Shape {
    fn spec(self) -> &'static ShapeSpec {
        SHAPES
            .iter()
            .find(|spec| spec.shape == self)
            .unwrap_or(&SHAPES[0])
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        SHAPES
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .map(|spec| spec.shape)
    }

    /// Maps a parsed style onto a shape by exact token lookup.
    ///
    /// `shape=` wins over the leading bare token; `rounded=1` only matters when neither is
    /// present. Unknown tokens classify as [`Shape::Rectangle`] and are reported in the
    /// returned [`ShapeMatch`].
    pub fn classify(style: &Style) -> ShapeMatch {
        if let Some(key) = style.get("shape") {
            let found = SHAPES
                .iter()
                .find(|spec| spec.shape_key == Some(key))
                .map(|spec| spec.shape)
                .or_else(|| {
                    SHAPE_KEY_ALIASES
                        .iter()
                        .find(|(alias, _)| *alias == key)
                        .map(|(_, shape)| *shape)
                });
            return match found {
                Some(shape) => ShapeMatch::known(shape),
                None => ShapeMatch::unknown(key),
            };
        }

        if let Some(token) = style.tokens().next() {
            let found = SHAPES
                .iter()
                .find(|spec| spec.base == Some(token) && spec.shape_key.is_none())
                .map(|spec| spec.shape);
            return match found {
                Some(shape) => ShapeMatch::known(shape),
                None => ShapeMatch::unknown(token),
            };
        }

        if style.flag("rounded") {
            ShapeMatch::known(Shape::Rounded)
        } else {
            ShapeMatch::known(Shape::Rectangle)
        }
    }

    /// Full style string for a freshly created vertex of this shape.
    pub fn vertex_style(self) -> String {
        let mut style = Style::default();
        self.apply_to(&mut style);
        format!("{style}{VERTEX_STYLE_TAIL}")
    }

    /// Rewrites only the shape-defining entries of `style`, leaving colors, fonts and the
    /// rest of the entries in place.
    pub fn apply_to(self, style: &mut Style) {
        let leading = style.tokens().next().map(str::to_owned);
        if let Some(token) = leading {
            if SHAPES.iter().any(|spec| spec.base == Some(token.as_str())) {
                style.remove_token(&token);
            }
        }
        style.remove("shape");
        style.remove("rounded");

        let spec = self.spec();
        let mut front = Vec::new();
        if let Some(base) = spec.base {
            front.push(StyleEntry::Token(base.to_owned()));
        }
        if let Some(key) = spec.shape_key {
            front.push(StyleEntry::Pair("shape".to_owned(), key.to_owned()));
        }
        if spec.base.is_none() && spec.shape_key.is_none() {
            let rounded = if spec.rounded { "1" } else { "0" };
            front.push(StyleEntry::Pair("rounded".to_owned(), rounded.to_owned()));
        }
        style.prepend(front);
    }
}

/// Result of [`Shape::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMatch {
    pub shape: Shape,
    /// The style token that had no table entry, if any.
    pub unknown_token: Option<String>,
}

impl ShapeMatch {
    fn known(shape: Shape) -> Self {
        Self {
            shape,
            unknown_token: None,
        }
    }

    fn unknown(token: &str) -> Self {
        Self {
            shape: Shape::Rectangle,
            unknown_token: Some(token.to_owned()),
        }
    }
}
