//! Fixed tables of well-known symbols addressed by trusted indices.
//!
//! Entries are append-only: a format version publishes a count, and every
//! index below that count keeps its meaning in all later versions.

use crate::format::FormatVersion;

pub const STABLE_ASSEMBLY: &str = "Microsoft.UI.Xaml";

const XAML: &str = "Microsoft.UI.Xaml";
const CONTROLS: &str = "Microsoft.UI.Xaml.Controls";
const MEDIA: &str = "Microsoft.UI.Xaml.Media";
const ANIMATION: &str = "Microsoft.UI.Xaml.Media.Animation";

/// (type namespace, type name)
pub(crate) const STABLE_TYPES: &[(&str, &str)] = &[
    (XAML, "ResourceDictionary"),
    (XAML, "Style"),
    (XAML, "Setter"),
    (XAML, "Thickness"),
    (XAML, "GridLength"),
    (CONTROLS, "Grid"),
    (CONTROLS, "StackPanel"),
    (CONTROLS, "Button"),
    (CONTROLS, "TextBlock"),
    (CONTROLS, "Border"),
    (CONTROLS, "ContentPresenter"),
    (CONTROLS, "ControlTemplate"),
    (CONTROLS, "RowDefinition"),
    (CONTROLS, "ColumnDefinition"),
    (MEDIA, "SolidColorBrush"),
    ("Windows.UI", "Color"),
    // version 2
    (XAML, "VisualStateGroup"),
    (XAML, "VisualState"),
    (CONTROLS, "Page"),
    (CONTROLS, "UserControl"),
    (CONTROLS, "TextBox"),
    (CONTROLS, "Image"),
    (ANIMATION, "Storyboard"),
    (ANIMATION, "DoubleAnimation"),
];

/// (stable declaring type, property name)
pub(crate) const STABLE_PROPERTIES: &[(u16, &str)] = &[
    (1, "Setters"),
    (1, "TargetType"),
    (2, "Property"),
    (2, "Value"),
    (5, "RowDefinitions"),
    (5, "ColumnDefinitions"),
    (6, "Orientation"),
    (7, "Content"),
    (8, "Text"),
    (9, "Child"),
    // version 2
    (9, "Background"),
    (11, "TargetType"),
    (16, "States"),
    (17, "Storyboard"),
    (18, "Content"),
    (20, "Text"),
];

/// Collection types whose historical names older consumers expect.
const LEGACY_TYPE_ALIASES: &[(&str, &str, &str)] = &[
    (XAML, "DependencyObjectCollection`1", "DependencyObjectCollection"),
    (CONTROLS, "UIElementCollection`1", "UIElementCollection"),
    (MEDIA, "TransformCollection`1", "TransformCollection"),
];

pub fn type_count(version: FormatVersion) -> u32 {
    match version.major {
        1 => 16,
        _ => STABLE_TYPES.len() as u32,
    }
}

pub fn property_count(version: FormatVersion) -> u32 {
    match version.major {
        1 => 10,
        _ => STABLE_PROPERTIES.len() as u32,
    }
}

pub fn type_index(version: FormatVersion, namespace: &str, name: &str) -> Option<u16> {
    let count = type_count(version) as usize;
    STABLE_TYPES[..count]
        .iter()
        .position(|&(ns, ty)| ns == namespace && ty == name)
        .map(|index| index as u16)
}

pub fn property_index(version: FormatVersion, declaring_type: u16, name: &str) -> Option<u16> {
    let count = property_count(version) as usize;
    STABLE_PROPERTIES[..count]
        .iter()
        .position(|&(owner, prop)| owner == declaring_type && prop == name)
        .map(|index| index as u16)
}

/// Looks up a trusted type index. `None` outside the version's stable range.
pub fn stable_type(version: FormatVersion, index: u16) -> Option<(&'static str, &'static str)> {
    if u32::from(index) >= type_count(version) {
        return None;
    }
    STABLE_TYPES.get(usize::from(index)).copied()
}

pub fn stable_property(version: FormatVersion, index: u16) -> Option<(u16, &'static str)> {
    if u32::from(index) >= property_count(version) {
        return None;
    }
    STABLE_PROPERTIES.get(usize::from(index)).copied()
}

/// Rewrites a type name for consumers of `version`.
pub fn alias_type_name<'a>(version: FormatVersion, namespace: &str, name: &'a str) -> &'a str {
    if version.major != 1 {
        return name;
    }
    LEGACY_TYPE_ALIASES
        .iter()
        .find(|&&(ns, from, _)| ns == namespace && from == name)
        .map_or(name, |&(_, _, to)| to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_v1_range_is_prefix_of_v2() {
        assert!(type_count(FormatVersion::V1) < type_count(FormatVersion::V2));
        assert!(property_count(FormatVersion::V1) < property_count(FormatVersion::V2));
        assert_eq!(type_count(FormatVersion::V2), type_count(FormatVersion::V2_1));
    }

    #[rstest::rstest]
    fn test_v1_properties_only_reference_v1_types() {
        let v1_types = type_count(FormatVersion::V1) as u16;
        for &(owner, _) in &STABLE_PROPERTIES[..property_count(FormatVersion::V1) as usize] {
            assert!(owner < v1_types);
        }
        for &(owner, _) in STABLE_PROPERTIES {
            assert!(u32::from(owner) < type_count(FormatVersion::V2));
        }
    }

    #[rstest::rstest]
    fn test_type_index_respects_version() {
        assert_eq!(type_index(FormatVersion::V1, CONTROLS, "Button"), Some(7));
        assert_eq!(type_index(FormatVersion::V2, CONTROLS, "Page"), Some(18));
        assert_eq!(type_index(FormatVersion::V1, CONTROLS, "Page"), None);
        assert_eq!(type_index(FormatVersion::V2, CONTROLS, "Slider"), None);
    }

    #[rstest::rstest]
    fn test_stable_boundary() {
        let count = type_count(FormatVersion::V2) as u16;
        assert!(stable_type(FormatVersion::V2, count - 1).is_some());
        assert!(stable_type(FormatVersion::V2, count).is_none());
        assert!(stable_type(FormatVersion::V1, 16).is_none());
    }

    #[rstest::rstest]
    fn test_aliases_only_apply_to_v1() {
        assert_eq!(
            alias_type_name(FormatVersion::V1, XAML, "DependencyObjectCollection`1"),
            "DependencyObjectCollection"
        );
        assert_eq!(
            alias_type_name(FormatVersion::V2, XAML, "DependencyObjectCollection`1"),
            "DependencyObjectCollection`1"
        );
        assert_eq!(alias_type_name(FormatVersion::V1, XAML, "Style"), "Style");
    }
}
