use kdl::{KdlDocument, KdlNode};
use std::path::Path;

use crate::chain::ChainConfig;
use crate::errors::OrreryError;

/// Parse a KDL document of `entity-chain` and `group-chain` nodes.
pub fn parse_chain_document(source: &str) -> Result<ChainConfig, OrreryError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| OrreryError::KdlParse(e.to_string()))?;

    let mut config = ChainConfig::default();

    for node in doc.nodes() {
        let target = match node.name().value() {
            "entity-chain" => &mut config.entity,
            "group-chain" => &mut config.group,
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
                continue;
            }
        };

        let kind = node.name().value();
        let name = first_string_arg(node).ok_or_else(|| {
            OrreryError::InvalidChainConfig(format!(
                "{kind} node requires a chain name (e.g. {kind} \"CREATE\")"
            ))
        })?;

        let hooks = hook_list(node, &name)?;
        if hooks.is_empty() {
            return Err(OrreryError::InvalidChainConfig(format!(
                "{kind} `{name}` lists no hooks"
            )));
        }

        target.insert(name, hooks);
    }

    Ok(config)
}

/// Load every `.kdl` file in `dir`, merged in file-name order.
pub fn load_chain_dir(dir: &Path) -> Result<ChainConfig, OrreryError> {
    if !dir.is_dir() {
        return Err(OrreryError::InvalidChainConfig(format!(
            "chains directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut config = ChainConfig::default();
    let mut file_count = 0;

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| OrreryError::ChainLoadError {
                path: path.display().to_string(),
                source,
            })?;
        config.merge(parse_chain_document(&contents)?);
        file_count += 1;
    }

    tracing::info!(
        files = file_count,
        entity_chains = config.entity.len(),
        group_chains = config.group.len(),
        "Loaded chain configuration"
    );

    Ok(config)
}

fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Dash-list children, one hook name per `- "name"` line.
fn hook_list(node: &KdlNode, chain: &str) -> Result<Vec<String>, OrreryError> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };

    let mut hooks = Vec::new();
    for child in children.nodes() {
        if child.name().value() != "-" {
            return Err(OrreryError::InvalidChainConfig(format!(
                "unexpected child `{}` in chain `{chain}` (expected `- \"hook-name\"`)",
                child.name().value()
            )));
        }
        let hook = first_string_arg(child).ok_or_else(|| {
            OrreryError::InvalidChainConfig(format!("hook entry in chain `{chain}` has no name"))
        })?;
        hooks.push(hook);
    }
    Ok(hooks)
}
