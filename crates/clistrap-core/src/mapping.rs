use std::collections::BTreeMap;

use crate::variant::Variant;

/// Where an archive's contents land inside a version directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedPath<'a> {
    /// Listed in a mapping tier; an empty subpath means the install root.
    Mapped(&'a str),
    /// Not listed in any tier; extraction falls back to the install root.
    Unmapped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderMapping {
    pub common: BTreeMap<String, String>,
    pub player_only: BTreeMap<String, String>,
    pub studio_only: BTreeMap<String, String>,
}

impl FolderMapping {
    pub fn variant_tier(&self, variant: Variant) -> &BTreeMap<String, String> {
        match variant {
            Variant::Player => &self.player_only,
            Variant::Studio => &self.studio_only,
        }
    }

    /// Looks up the relative extraction subpath for `file_name`, preferring
    /// the variant's own tier, then the common tier, then the other
    /// variant's tier.
    pub fn resolve(&self, variant: Variant, file_name: &str) -> MappedPath<'_> {
        let other = match variant {
            Variant::Player => Variant::Studio,
            Variant::Studio => Variant::Player,
        };
        [self.variant_tier(variant), &self.common, self.variant_tier(other)]
            .into_iter()
            .find_map(|tier| tier.get(file_name))
            .map_or(MappedPath::Unmapped, |subpath| MappedPath::Mapped(subpath))
    }

    pub fn builtin() -> Self {
        Self {
            common: tier(COMMON_MAPPINGS),
            player_only: tier(PLAYER_ONLY_MAPPINGS),
            studio_only: tier(STUDIO_ONLY_MAPPINGS),
        }
    }
}

fn tier(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(file, subpath)| (file.to_string(), subpath.to_string()))
        .collect()
}

const COMMON_MAPPINGS: &[(&str, &str)] = &[
    ("redist.zip", ""),
    ("WebView2.zip", ""),
    ("WebView2RuntimeInstaller.zip", "WebView2RuntimeInstaller/"),
    ("shaders.zip", "shaders/"),
    ("ssl.zip", "ssl/"),
    ("content-avatar.zip", "content/avatar/"),
    ("content-configs.zip", "content/configs/"),
    ("content-fonts.zip", "content/fonts/"),
    ("content-models.zip", "content/models/"),
    ("content-sky.zip", "content/sky/"),
    ("content-sounds.zip", "content/sounds/"),
    ("content-textures2.zip", "content/textures/"),
    ("content-textures3.zip", "PlatformContent/pc/textures/"),
    ("content-terrain.zip", "PlatformContent/pc/terrain/"),
    ("content-platform-fonts.zip", "PlatformContent/pc/fonts/"),
    (
        "content-platform-dictionaries.zip",
        "PlatformContent/pc/shared_compression_dictionaries/",
    ),
    ("extracontent-luapackages.zip", "ExtraContent/LuaPackages/"),
    ("extracontent-translations.zip", "ExtraContent/translations/"),
    ("extracontent-models.zip", "ExtraContent/models/"),
    ("extracontent-textures.zip", "ExtraContent/textures/"),
];

const PLAYER_ONLY_MAPPINGS: &[(&str, &str)] = &[
    ("RobloxApp.zip", ""),
    ("RobloxPlayerLauncher.exe", ""),
    ("extracontent-places.zip", "ExtraContent/places/"),
];

const STUDIO_ONLY_MAPPINGS: &[(&str, &str)] = &[
    ("RobloxStudio.zip", ""),
    ("Libraries.zip", ""),
    ("LibrariesQt5.zip", ""),
    ("content-studio_svg_textures.zip", "content/studio_svg_textures/"),
    ("content-qt_translations.zip", "content/qt_translations/"),
    ("content-api-docs.zip", "content/api_docs/"),
    ("extracontent-scripts.zip", "ExtraContent/scripts/"),
    ("BuiltInPlugins.zip", "BuiltInPlugins/"),
    ("BuiltInStandalonePlugins.zip", "BuiltInStandalonePlugins/"),
    ("ApplicationConfig.zip", "ApplicationConfig/"),
    ("Plugins.zip", "Plugins/"),
    ("Qml.zip", "Qml/"),
    ("StudioFonts.zip", "StudioFonts/"),
    ("RibbonConfig.zip", "RibbonConfig/"),
];
