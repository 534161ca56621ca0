//! Power supplies, voltmeters and system monitors.
//!
//! The instrument is a set of named channels, each with a few nodes: a node is one settable
//! or measurable quantity such as a supply enable, its voltage or a current reading.

use crate::{Error, Result};
use crate::params::{Instrument, Key, Param, StepRange, Value};
use crate::session::SessionRef;
use crate::sys::{Driver, Target};
use crate::wire::{AnalogIoType, WireEnum};
use super::count;

const TARGET: Target = Target { instrument: Instrument::AnalogIo, channel: None };

pub struct AnalogIo<D: Driver> {
    session: SessionRef<D>,
}

impl<D: Driver> AnalogIo<D> {
    pub(crate) fn new(session: SessionRef<D>) -> AnalogIo<D> {
        AnalogIo { session }
    }

    pub fn reset(&self) -> Result<()> {
        self.session.with(|link| link.reset(TARGET))
    }

    pub fn configure(&self) -> Result<()> {
        self.session.with(|link| link.configure(TARGET, false, false))
    }

    /// Reads the monitored quantities for the `*_status` readers.
    pub fn status(&self) -> Result<()> {
        self.session.with(|link| link.status(TARGET, true).map(|_| ()))
    }

    /// Whether the master enable can be set and whether its state can be read back.
    pub fn enable_info(&self) -> Result<(bool, bool)> {
        self.session.with(|link| link.info_support(Key::new(Param::AnalogIoEnable)))
    }

    /// Master enable of the supplies.
    pub fn enable_set(&self, enable: bool) -> Result<()> {
        self.session.with(|link| link.set(Key::new(Param::AnalogIoEnable), Value::Bool(enable)))
    }

    pub fn enable_get(&self) -> Result<bool> {
        self.session.with(|link| link.get_bool(Key::new(Param::AnalogIoEnable)))
    }

    pub fn enable_status(&self) -> Result<bool> {
        self.session.with(|link| link.get_bool(Key::new(Param::AnalogIoEnableStatus)))
    }

    pub fn channel_count(&self) -> Result<usize> {
        self.session.with(|link| Ok(link.channel_count(Instrument::AnalogIo)))
    }

    /// Name and short label of `channel`.
    pub fn channel_name(&self, channel: usize) -> Result<(String, String)> {
        self.session.with(|link| link.name(Key::channel(Param::AnalogIoChannelName, channel)))
    }

    /// Number of nodes of `channel`.
    pub fn channel_info(&self, channel: usize) -> Result<usize> {
        self.session.with(|link| {
            link.get_int(Key::channel(Param::AnalogIoChannelNodes, channel)).map(count)
        })
    }

    /// Name and units of a node.
    pub fn channel_node_name(&self, channel: usize, node: usize) -> Result<(String, String)> {
        self.session.with(|link| link.name(Key::node(Param::AnalogIoNodeName, channel, node)))
    }

    /// Quantity a node controls or measures; `None` for a node with no quantity.
    pub fn channel_node_info(&self, channel: usize, node: usize) -> Result<Option<AnalogIoType>> {
        self.session.with(|link| {
            let key = Key::node(Param::AnalogIoNodeType, channel, node);
            match link.get_int(key)? {
                0 => Ok(None),
                code => AnalogIoType::from_wire(code)
                    .map(Some)
                    .ok_or(Error::UnknownCode { operation: key.param.get_operation(), code }),
            }
        })
    }

    /// Settable range of a node. Read-only nodes fail.
    pub fn channel_node_set_info(&self, channel: usize, node: usize) -> Result<StepRange> {
        self.session.with(|link| link.info_steps(Key::node(Param::AnalogIoNode, channel, node)))
    }

    pub fn channel_node_set(&self, channel: usize, node: usize, value: f64) -> Result<()> {
        self.session.with(|link| {
            link.set(Key::node(Param::AnalogIoNode, channel, node), Value::Float(value))
        })
    }

    pub fn channel_node_get(&self, channel: usize, node: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(Key::node(Param::AnalogIoNode, channel, node)))
    }

    pub fn channel_node_status_info(&self, channel: usize, node: usize) -> Result<StepRange> {
        self.session.with(|link| {
            link.info_steps(Key::node(Param::AnalogIoNodeStatus, channel, node))
        })
    }

    /// Value of a node as of the last [`status`](Self::status).
    pub fn channel_node_status(&self, channel: usize, node: usize) -> Result<f64> {
        self.session.with(|link| link.get_float(Key::node(Param::AnalogIoNodeStatus, channel, node)))
    }
}
