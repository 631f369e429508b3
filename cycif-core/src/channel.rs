//! Channel registry: one pyramid branch and one live transfer function per
//! configured channel.

use std::rc::Rc;
use crate::config::ViewerConfig;
use crate::error::{Error, Result};
use crate::transfer::{Rgb, TransferFunction};

/// Which end of a transfer ramp a colour edit applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorStop {
    Start,
    End,
}

#[derive(Clone, Debug)]
pub struct Channel {
    pub index: usize,
    pub name: String,
    pub full_name: String,
    pub branch: String,
    pub active: bool,
    tf: Rc<TransferFunction>,
}

impl Channel {
    /// The channel's current table. Cheap to clone and safe to hold across
    /// a table replacement.
    pub fn transfer(&self) -> Rc<TransferFunction> {
        Rc::clone(&self.tf)
    }
}

#[derive(Clone, Debug)]
pub struct ChannelSet {
    channels: Vec<Channel>,
    label_branch: Option<String>,
}

impl ChannelSet {
    /// All channels start inactive with the default black-to-white ramp.
    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        let channels = config
            .channels
            .iter()
            .enumerate()
            .map(|(index, desc)| {
                let branch = desc
                    .branch()
                    .ok_or_else(|| Error::InvalidConfig(format!("channel {} has no tile path", desc.full_name)))?;
                Ok(Channel {
                    index,
                    name: desc.name.clone(),
                    full_name: desc.full_name.clone(),
                    branch: branch.to_string(),
                    active: false,
                    tf: Rc::new(TransferFunction::default_ramp(config.transfer_bins)),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            channels,
            label_branch: config.label_branch().map(str::to_string),
        })
    }

    pub fn label_branch(&self) -> Option<&str> {
        self.label_branch.as_deref()
    }

    pub fn all(&self) -> &[Channel] {
        &self.channels
    }

    /// Active channels in configuration order.
    pub fn active(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.active)
    }

    pub fn get(&self, full_name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.full_name == full_name)
    }

    fn get_mut(&mut self, full_name: &str) -> Result<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|c| c.full_name == full_name)
            .ok_or_else(|| Error::UnknownChannel(full_name.to_string()))
    }

    pub fn full_name(&self, short: &str) -> Option<&str> {
        self.channels.iter().find(|c| c.name == short).map(|c| c.full_name.as_str())
    }

    pub fn short_name(&self, full: &str) -> Option<&str> {
        self.get(full).map(|c| c.name.as_str())
    }

    pub fn set_active(&mut self, full_name: &str, active: bool) -> Result<()> {
        self.get_mut(full_name)?.active = active;
        Ok(())
    }

    /// Replace the channel's table with one over `[min, max]`.
    pub fn update_range(&mut self, full_name: &str, min: f64, max: f64) -> Result<()> {
        let ch = self.get_mut(full_name)?;
        ch.tf = Rc::new(ch.tf.with_range(min, max));
        Ok(())
    }

    /// Replace the channel's table with one ending (or starting) at `color`.
    pub fn update_color(&mut self, full_name: &str, stop: ColorStop, color: Rgb) -> Result<()> {
        let ch = self.get_mut(full_name)?;
        let (start, end) = match stop {
            ColorStop::Start => (color, ch.tf.end_color()),
            ColorStop::End => (ch.tf.start_color(), color),
        };
        ch.tf = Rc::new(ch.tf.with_colors(start, end));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{BLACK, WHITE};

    fn set() -> ChannelSet {
        let config = ViewerConfig::from_json(
            r#"{
                "channels": [
                    { "name": "DNA", "fullName": "DNA_1", "src": "/t/DNA_1_files/" },
                    { "name": "CD45", "fullName": "CD45_Mem", "src": "/t/CD45_files/" },
                    { "name": "KI67", "fullName": "KI67_Cyto", "src": "/t/KI67_files/" }
                ],
                "labelSrc": "/t/mask_files/",
                "transferBins": 64
            }"#,
        )
        .unwrap();
        ChannelSet::from_config(&config).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let set = set();
        assert_eq!(set.label_branch(), Some("mask_files"));
        assert_eq!(set.active().count(), 0);
        let ch = set.get("CD45_Mem").unwrap();
        assert_eq!(ch.index, 1);
        assert_eq!(ch.branch, "CD45_files");
        let tf = ch.transfer();
        assert_eq!((tf.min(), tf.max()), (0.0, 65535.0));
        assert_eq!((tf.start_color(), tf.end_color()), (BLACK, WHITE));
        assert_eq!(tf.num_bins(), 64);
    }

    #[test]
    fn test_active_keeps_config_order() {
        let mut set = set();
        set.set_active("KI67_Cyto", true).unwrap();
        set.set_active("DNA_1", true).unwrap();
        let names: Vec<_> = set.active().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["DNA", "KI67"]);
        set.set_active("DNA_1", false).unwrap();
        assert_eq!(set.active().count(), 1);
    }

    #[test]
    fn test_updates_replace_table() {
        let mut set = set();
        let before = set.get("DNA_1").unwrap().transfer();
        set.update_range("DNA_1", 1000.0, 5000.0).unwrap();
        let after = set.get("DNA_1").unwrap().transfer();
        assert!(!Rc::ptr_eq(&before, &after));
        // the old table is untouched for anyone still holding it
        assert_eq!(before.min(), 0.0);
        assert_eq!((after.min(), after.max()), (1000.0, 5000.0));

        set.update_color("DNA_1", ColorStop::End, [0, 0, 255]).unwrap();
        set.update_color("DNA_1", ColorStop::Start, [10, 0, 0]).unwrap();
        let tf = set.get("DNA_1").unwrap().transfer();
        assert_eq!(tf.end_color(), [0, 0, 255]);
        assert_eq!(tf.start_color(), [10, 0, 0]);
        assert_eq!(tf.min(), 1000.0);
    }

    #[test]
    fn test_name_resolution() {
        let mut set = set();
        assert_eq!(set.full_name("KI67"), Some("KI67_Cyto"));
        assert_eq!(set.short_name("CD45_Mem"), Some("CD45"));
        assert_eq!(set.full_name("nope"), None);
        assert!(matches!(set.set_active("nope", true), Err(Error::UnknownChannel(_))));
        assert!(set.update_range("nope", 0.0, 1.0).is_err());
    }
}
