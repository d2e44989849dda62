//! Effect kind catalog: `kind_id` → descriptive metadata + default
//! parameter blob.
//!
//! This is the repository boundary the stack builds new leaves from. The
//! built-in table below stands in for the on-disk catalog of the full
//! application; the stack only needs that a kind exists and that its
//! default parameters are attachable to a new leaf.

use std::sync::LazyLock;

use serde_json::json;

/// Descriptive metadata for one effect kind.
#[derive(Debug, Clone)]
pub struct EffectKind {
    pub id: &'static str,
    /// Human-readable name ("Gaussian Blur")
    pub name: &'static str,
    /// Audio-only effect (drives the stack's `is_audio` OR-fold)
    pub audio: bool,
    /// At most one instance per stack
    pub unique: bool,
    /// Pinned in the UI picker
    pub favorite: bool,
    /// Default parameter set, serialized. Opaque to the stack: it is
    /// decoded into the new leaf's filter properties and never inspected.
    pub default_params: serde_json::Value,
}

static KINDS: LazyLock<Vec<EffectKind>> = LazyLock::new(|| {
    vec![
        EffectKind {
            id: "sepia",
            name: "Sepia",
            audio: false,
            unique: false,
            favorite: false,
            default_params: json!({ "u": 75, "v": 150 }),
        },
        EffectKind {
            id: "brightness",
            name: "Brightness",
            audio: false,
            unique: false,
            favorite: true,
            default_params: json!({ "level": 1.0 }),
        },
        EffectKind {
            id: "gaussian_blur",
            name: "Gaussian Blur",
            audio: false,
            unique: false,
            favorite: true,
            default_params: json!({ "radius": 5.0 }),
        },
        EffectKind {
            id: "hsv_adjust",
            name: "Adjust HSV",
            audio: false,
            unique: false,
            favorite: false,
            default_params: json!({ "hue_shift": 0.0, "saturation": 1.0, "value": 1.0 }),
        },
        EffectKind {
            id: "invert",
            name: "Invert Colors",
            audio: false,
            unique: false,
            favorite: false,
            default_params: json!({}),
        },
        EffectKind {
            id: "fade_from_black",
            name: "Fade from Black",
            audio: false,
            unique: true,
            favorite: false,
            default_params: json!({ "in": 0, "out": 25 }),
        },
        EffectKind {
            id: "volume",
            name: "Volume",
            audio: true,
            unique: false,
            favorite: false,
            default_params: json!({ "gain": 1.0 }),
        },
        EffectKind {
            id: "fadein",
            name: "Fade in (audio)",
            audio: true,
            unique: true,
            favorite: false,
            default_params: json!({ "in": 0, "out": 25 }),
        },
    ]
});

/// Look up a kind by id. Unknown ids are a `None`, never a panic.
pub fn get(kind_id: &str) -> Option<&'static EffectKind> {
    KINDS.iter().find(|k| k.id == kind_id)
}

pub fn exists(kind_id: &str) -> bool {
    get(kind_id).is_some()
}

/// All registered kinds, stable order (UI pickers).
pub fn all() -> &'static [EffectKind] {
    &KINDS
}
