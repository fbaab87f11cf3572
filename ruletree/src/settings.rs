use serde::{Deserialize, Serialize};

/// Formatting preferences handed to the field model when it is built.
///
/// These are the knobs an application would otherwise keep as global
/// preferences; the engine only ever reads them through the fields that
/// were stamped with a copy at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSettings {
    /// Character placed between integer and fraction digits of numbers.
    #[serde(default = "FormatSettings::default_decimal_point")]
    pub decimal_point: char,
    /// Character placed between digit groups when a number pattern asks for grouping.
    #[serde(default = "FormatSettings::default_grouping_separator")]
    pub grouping_separator: char,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            decimal_point: Self::default_decimal_point(),
            grouping_separator: Self::default_grouping_separator(),
        }
    }
}

impl FormatSettings {
    fn default_decimal_point() -> char {
        '.'
    }

    fn default_grouping_separator() -> char {
        ','
    }
}
