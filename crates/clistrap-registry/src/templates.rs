use std::path::Path;

use anyhow::Result;
use clistrap_core::{Variant, VersionHash};

use crate::model::{ConfigValue, KeyPath, ValueName};
use crate::tree::{DesiredConfigTree, KeyNode};

pub const CLASSES_ROOT: &str = r"HKCU\Software\Classes";
pub const ENVIRONMENTS_KEY: &str = r"HKCU\Software\ROBLOX Corporation\Environments";

const PLAYER_PROTOCOLS: &[&str] = &["roblox", "roblox-player"];
const STUDIO_PROTOCOLS: &[&str] = &["roblox-studio", "roblox-studio-auth"];
const PLACE_CLASS: &str = "Roblox.Place";
const PLACE_EXTENSIONS: &[&str] = &[".rbxl", ".rbxlx"];

/// Everything the association templates need about one installed build.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub variant: Variant,
    pub version: &'a VersionHash,
    pub version_dir: &'a Path,
    pub executable: &'a Path,
    /// Program invoked by the shell for protocol links and place files.
    pub launcher: &'a Path,
}

impl TemplateContext<'_> {
    fn open_command(&self) -> String {
        format!(
            "\"{}\" launch {} \"%1\"",
            self.launcher.display(),
            self.variant.as_str()
        )
    }

    fn icon(&self) -> String {
        self.executable.display().to_string()
    }
}

fn environment_name(variant: Variant) -> &'static str {
    match variant {
        Variant::Player => "roblox-player",
        Variant::Studio => "roblox-studio",
    }
}

fn protocol_display_name(variant: Variant) -> &'static str {
    match variant {
        Variant::Player => "URL:Roblox Player Protocol (clistrap)",
        Variant::Studio => "URL:Roblox Studio Protocol (clistrap)",
    }
}

fn protocols(variant: Variant) -> &'static [&'static str] {
    match variant {
        Variant::Player => PLAYER_PROTOCOLS,
        Variant::Studio => STUDIO_PROTOCOLS,
    }
}

fn protocol_node(ctx: &TemplateContext<'_>) -> KeyNode {
    let command = KeyNode::new()
        .value(ConfigValue::default_value(ctx.open_command()))
        .value(ConfigValue::string("version", ctx.version.upload_id()));
    KeyNode::new()
        .value(ConfigValue::default_value(protocol_display_name(ctx.variant)))
        .value(ConfigValue::string("URL Protocol", ""))
        .subkey(
            "DefaultIcon",
            KeyNode::new().value(ConfigValue::default_value(ctx.icon())),
        )
        .subkey(
            "shell",
            KeyNode::new().subkey(
                "open",
                KeyNode::new()
                    .value(ConfigValue::default_value("Open"))
                    .subkey("command", command),
            ),
        )
}

fn environment_node(ctx: &TemplateContext<'_>) -> KeyNode {
    let env = environment_name(ctx.variant);
    let mut associations = KeyNode::new();
    for protocol in protocols(ctx.variant) {
        associations.set_value(ConfigValue::string(protocol, *protocol));
    }
    KeyNode::new()
        .value(ConfigValue::string(env, ctx.version_dir.display().to_string()))
        .subkey(
            env,
            KeyNode::new()
                .value(ConfigValue::string("version", ctx.version.upload_id()))
                .subkey(
                    "Capabilities",
                    KeyNode::new()
                        .value(ConfigValue::string(
                            "ApplicationName",
                            format!("clistrap {}", ctx.variant),
                        ))
                        .subkey("UrlAssociations", associations),
                ),
        )
}

fn place_nodes(ctx: &TemplateContext<'_>) -> Vec<(&'static str, KeyNode)> {
    let place = KeyNode::new()
        .value(ConfigValue::default_value("Roblox Place"))
        .subkey(
            "DefaultIcon",
            KeyNode::new().value(ConfigValue::default_value(format!("{},0", ctx.icon()))),
        )
        .subkey(
            "shell",
            KeyNode::new().subkey(
                "Open",
                KeyNode::new()
                    .value(ConfigValue::default_value("Open"))
                    .subkey(
                        "command",
                        KeyNode::new().value(ConfigValue::default_value(ctx.open_command())),
                    ),
            ),
        );
    let mut nodes = vec![(PLACE_CLASS, place)];
    for extension in PLACE_EXTENSIONS {
        nodes.push((
            *extension,
            KeyNode::new()
                .value(ConfigValue::default_value(PLACE_CLASS))
                .subkey(
                    PLACE_CLASS,
                    KeyNode::new().subkey(
                        "ShellNew",
                        KeyNode::new().value(ConfigValue::default_value(PLACE_CLASS)),
                    ),
                ),
        ));
    }
    nodes
}

/// Protocol handlers, environment metadata and, for studio, the place class
/// and file extensions, all pointing at the given build.
pub fn association_tree(ctx: &TemplateContext<'_>) -> Result<DesiredConfigTree> {
    let classes = KeyPath::parse(CLASSES_ROOT)?;
    let mut tree = DesiredConfigTree::new();
    for protocol in protocols(ctx.variant) {
        tree.insert(classes.join(protocol)?, protocol_node(ctx));
    }
    if ctx.variant == Variant::Studio {
        for (name, node) in place_nodes(ctx) {
            tree.insert(classes.join(name)?, node);
        }
    }
    tree.insert(KeyPath::parse(ENVIRONMENTS_KEY)?, environment_node(ctx));
    Ok(tree)
}

/// Values owned by a variant that `unregister` removes first.
pub fn owned_values(variant: Variant) -> Result<Vec<(KeyPath, ValueName)>> {
    Ok(vec![(
        KeyPath::parse(ENVIRONMENTS_KEY)?,
        ValueName::new(environment_name(variant)),
    )])
}

/// Root keys owned by a variant; deleting them removes every subkey.
pub fn owned_keys(variant: Variant) -> Result<Vec<KeyPath>> {
    let classes = KeyPath::parse(CLASSES_ROOT)?;
    let environments = KeyPath::parse(ENVIRONMENTS_KEY)?;
    let mut keys = vec![environments.join(environment_name(variant))?];
    keys.push(environments.join(match variant {
        Variant::Player => "RobloxPlayer",
        Variant::Studio => "RobloxStudio",
    })?);
    for protocol in protocols(variant) {
        keys.push(classes.join(protocol)?);
    }
    if variant == Variant::Studio {
        keys.push(classes.join(PLACE_CLASS)?);
        for extension in PLACE_EXTENSIONS {
            keys.push(classes.join(extension)?);
        }
    }
    Ok(keys)
}
