use orrery::Manager;

/// Builder for creating test entities through the Manager
pub struct EntityBuilder {
    id: String,
    secret: String,
    groups: Vec<String>,
    capabilities: Vec<String>,
    locked: bool,
}

impl EntityBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            secret: "password123".to_string(),
            groups: Vec::new(),
            capabilities: Vec::new(),
            locked: false,
        }
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.groups.push(group.to_string());
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub async fn create(self, manager: &Manager) {
        manager
            .create_entity(&self.id, -1, &self.secret)
            .await
            .expect("Failed to create test entity");

        for group in &self.groups {
            manager
                .add_entity_to_group(&self.id, group)
                .await
                .expect("Failed to add entity to group");
        }
        for cap in &self.capabilities {
            manager
                .set_entity_capability(&self.id, cap)
                .await
                .expect("Failed to grant capability");
        }
        if self.locked {
            manager.lock_entity(&self.id).await.expect("Failed to lock entity");
        }
    }
}

/// Builder for creating test groups through the Manager
pub struct GroupBuilder {
    name: String,
    display_name: String,
    managed_by: Option<String>,
    capabilities: Vec<String>,
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl GroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: String::new(),
            managed_by: None,
            capabilities: Vec::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn managed_by(mut self, group: &str) -> Self {
        self.managed_by = Some(group.to_string());
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    /// Child groups must already exist when `create` runs.
    pub fn including(mut self, child: &str) -> Self {
        self.includes.push(child.to_string());
        self
    }

    pub fn excluding(mut self, child: &str) -> Self {
        self.excludes.push(child.to_string());
        self
    }

    pub async fn create(self, manager: &Manager) {
        manager
            .create_group(&self.name, &self.display_name, self.managed_by.as_deref(), -1)
            .await
            .expect("Failed to create test group");

        for cap in &self.capabilities {
            manager
                .set_group_capability(&self.name, cap)
                .await
                .expect("Failed to grant group capability");
        }
        for child in &self.includes {
            manager
                .modify_group_rule(&self.name, child, "INCLUDE")
                .await
                .expect("Failed to add INCLUDE rule");
        }
        for child in &self.excludes {
            manager
                .modify_group_rule(&self.name, child, "EXCLUDE")
                .await
                .expect("Failed to add EXCLUDE rule");
        }
    }
}
