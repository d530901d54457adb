use crate::errors::OrreryError;
use crate::manager::Manager;
use crate::patch::{self, PatchMode};
use crate::storage::SearchRequest;
use crate::types::{Capability, ExpansionRule, Group};

impl Manager {
    /// Create a group. An empty display name defaults to the group name and a
    /// `number` of zero or less allocates the next free number.
    pub async fn create_group(
        &self,
        name: &str,
        display_name: &str,
        managed_by: Option<&str>,
        number: i32,
    ) -> Result<(), OrreryError> {
        let delta = Group {
            name: name.to_string(),
            display_name: display_name.to_string(),
            number,
            managed_by: managed_by.map(str::to_string),
            ..Default::default()
        };
        self.group_chain("CREATE", &delta).await?;
        tracing::info!(group = name, "Created group");
        Ok(())
    }

    pub async fn destroy_group(&self, name: &str) -> Result<(), OrreryError> {
        self.group_chain("DESTROY", &Group::new(name)).await?;
        tracing::info!(group = name, "Destroyed group");
        Ok(())
    }

    /// Update the display name and managing group. Empty fields in `update`
    /// leave the stored values alone.
    pub async fn update_group_meta(&self, name: &str, update: &Group) -> Result<(), OrreryError> {
        let delta = Group {
            name: name.to_string(),
            display_name: update.display_name.clone(),
            managed_by: update.managed_by.clone(),
            ..Default::default()
        };
        self.group_chain("MERGE-METADATA", &delta).await?;
        Ok(())
    }

    pub async fn manage_group_um(
        &self,
        name: &str,
        mode: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<String>, OrreryError> {
        let mode: PatchMode = mode.parse()?;
        if mode == PatchMode::Read {
            let group = self.refs.storage.load_group(name).await?;
            return Ok(patch::patch_key_values(&group.untyped_meta, mode, key, value));
        }

        let mut delta = Group::new(name);
        delta.untyped_meta = vec![super::um_entry(key, value)?];
        let chain = format!("UM-{}", mode.as_str());
        Ok(self.group_chain(&chain, &delta).await?.untyped_meta)
    }

    pub async fn set_group_capability(&self, name: &str, capability: &str) -> Result<(), OrreryError> {
        let cap: Capability = capability.parse()?;
        self.group_capability_chain("SET-CAPABILITY", name, cap).await
    }

    pub async fn drop_group_capability(&self, name: &str, capability: &str) -> Result<(), OrreryError> {
        let cap: Capability = capability.parse()?;
        self.group_capability_chain("DROP-CAPABILITY", name, cap).await
    }

    async fn group_capability_chain(&self, chain: &str, name: &str, cap: Capability) -> Result<(), OrreryError> {
        let mut delta = Group::new(name);
        delta.capabilities = vec![cap];
        self.group_chain(chain, &delta).await?;
        tracing::info!(group = name, capability = %cap, chain, "Changed group capability");
        Ok(())
    }

    /// Add, replace or drop the expansion rule `parent` holds for `child`.
    ///
    /// `INCLUDE` and `EXCLUDE` replace any existing rule for the same child;
    /// `DROP` removes it.
    pub async fn modify_group_rule(&self, parent: &str, child: &str, mode: &str) -> Result<(), OrreryError> {
        let mut delta = Group::new(parent);
        let chain = match mode.trim().to_ascii_uppercase().as_str() {
            "DROP" => {
                delta.expansions = vec![ExpansionRule::include(child)];
                "DROP-RULE"
            }
            other => {
                delta.expansions = vec![ExpansionRule {
                    mode: other.parse()?,
                    child: child.to_string(),
                }];
                "MODIFY-RULE"
            }
        };

        self.group_chain(chain, &delta).await?;
        tracing::info!(parent, child, mode, "Modified expansion rule");
        Ok(())
    }

    pub async fn fetch_group(&self, name: &str) -> Result<Group, OrreryError> {
        Ok(self.refs.storage.load_group(name).await?)
    }

    pub async fn search_groups(&self, req: &SearchRequest) -> Result<Vec<Group>, OrreryError> {
        Ok(self.refs.storage.search_groups(req).await?)
    }
}
