//! Built-in EQ Presets

use crate::eq::NUM_BANDS;

/// Named EQ preset with 10 band gains (dB)
pub type Preset = (&'static str, [f32; NUM_BANDS]);

/// List of built-in presets
pub const PRESETS: &[Preset] = &[
    ("Flat", [0.0; NUM_BANDS]),
    ("Rock", [4.0, 3.0, 2.0, 0.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0]),
    ("Bass", [6.0, 5.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Vocal", [-2.0, -2.0, -1.0, 0.0, 3.0, 4.0, 3.0, 1.0, 0.0, 0.0]),
    ("Jazz", [2.0, 2.0, 0.0, 2.0, 2.0, 2.0, 0.0, 2.0, 3.0, 4.0]),
];

/// Look up a preset by name, ignoring ASCII case
pub fn find_preset(name: &str) -> Option<&'static [f32; NUM_BANDS]> {
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, gains)| gains)
}
