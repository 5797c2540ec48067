//! Named factories for fresh slot infos and slot data.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::constants::DEFAULT_TEMPLATE;

use super::{SlotData, SlotInfo};

type InfoFactory = Box<dyn Fn() -> SlotInfo + Send + Sync>;
type DataFactory = Box<dyn Fn() -> SlotData + Send + Sync>;

/// Registry of slot templates selected by the preset.
///
/// The `"default"` template is always present; unknown names fall back to it.
pub struct SlotTemplates {
    infos: HashMap<String, InfoFactory>,
    datas: HashMap<String, DataFactory>,
}

impl Default for SlotTemplates {
    fn default() -> Self {
        let mut templates = Self {
            infos: HashMap::new(),
            datas: HashMap::new(),
        };
        templates.register_info(DEFAULT_TEMPLATE, SlotInfo::default);
        templates.register_data(DEFAULT_TEMPLATE, SlotData::default);
        templates
    }
}

impl SlotTemplates {
    pub fn register_info(
        &mut self,
        name: &str,
        factory: impl Fn() -> SlotInfo + Send + Sync + 'static,
    ) {
        self.infos.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_data(
        &mut self,
        name: &str,
        factory: impl Fn() -> SlotData + Send + Sync + 'static,
    ) {
        self.datas.insert(name.to_string(), Box::new(factory));
    }

    pub fn instantiate_info(&self, name: Option<&str>) -> SlotInfo {
        let name = name.unwrap_or(DEFAULT_TEMPLATE);
        let (name, factory) = match self.infos.get(name) {
            Some(factory) => (name, factory),
            None => {
                warn!("Unknown slot info template '{}', using default", name);
                (DEFAULT_TEMPLATE, &self.infos[DEFAULT_TEMPLATE])
            }
        };
        let mut info = factory();
        info.template = name.to_string();
        info
    }

    pub fn instantiate_data(&self, name: Option<&str>) -> SlotData {
        let name = name.unwrap_or(DEFAULT_TEMPLATE);
        let (name, factory) = match self.datas.get(name) {
            Some(factory) => (name, factory),
            None => {
                warn!("Unknown slot data template '{}', using default", name);
                (DEFAULT_TEMPLATE, &self.datas[DEFAULT_TEMPLATE])
            }
        };
        let mut data = factory();
        data.template = name.to_string();
        data
    }
}
