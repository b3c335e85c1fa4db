use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use stone_script::{EntityRef, EntityType, Fields, Host, HostError, HostResult};

use crate::config::TemplateConfig;

/// Headless host backed by the configured template table
///
/// There is no simulation behind it: side effects are logged, and player
/// transfers are acknowledged without a network hand-off.
pub struct StoneHost {
    templates: BTreeMap<String, TemplateConfig>,
}

impl StoneHost {
    pub fn new(templates: BTreeMap<String, TemplateConfig>) -> Self {
        Self { templates }
    }
}

impl Host for StoneHost {
    fn instantiate_template(&self, kind: EntityType, template: &str) -> HostResult<Vec<(String, Fields)>> {
        let config = self
            .templates
            .get(template)
            .ok_or_else(|| HostError::UnknownTemplate(template.to_string()))?;

        if config.item != (kind == EntityType::ItemEntity) {
            return Err(HostError::Rejected {
                operation: "instantiate_template".to_string(),
                reason: format!("template '{}' cannot create a {} entity", template, kind.as_str()),
            });
        }

        Ok(config
            .components
            .iter()
            .map(|(identifier, fields)| (identifier.clone(), fields.clone()))
            .collect())
    }

    fn component_applied(&mut self, entity: EntityRef, identifier: &str, fields: &Fields) -> HostResult<()> {
        trace!("{} {} = {}", entity, identifier, serde_json::Value::Object(fields.clone()));
        Ok(())
    }

    fn display_chat(&mut self, message: &str) {
        info!("[chat] {}", message);
    }

    fn spawn_particle(&mut self, effect: &str, entity: EntityRef, offset: [f64; 3]) -> HostResult<()> {
        debug!("Particle '{}' on {} at offset {:?}", effect, entity, offset);
        Ok(())
    }

    fn transfer_player(&mut self, player: EntityRef, host: &str, port: u16) -> HostResult<()> {
        info!("Player {} handed off to {}:{}", player, host, port);
        Ok(())
    }
}
