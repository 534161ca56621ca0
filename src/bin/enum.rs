use std::sync::Arc;

use dwf::{Driver, EnumFilter};

#[cfg(feature = "hardware")]
fn driver() -> Arc<dwf::LibDwf> {
    Arc::new(dwf::LibDwf::new())
}

#[cfg(not(feature = "hardware"))]
fn driver() -> Arc<dwf::SimDriver> {
    Arc::new(dwf::SimDriver::default())
}

fn list<D: Driver>(driver: &D) -> dwf::Result<()> {
    let devices = dwf::enumerate(driver, EnumFilter::All)?;
    if devices.is_empty() {
        println!("no devices found");
    }
    for device in devices {
        println!("#{} {} ({:?}), serial {}, user name {:?}{}",
                 device.index, device.name, device.version, device.serial, device.user_name,
                 if device.opened { ", in use" } else { "" });
        for config in &device.configurations {
            let caps = &config.capabilities;
            println!("  config {}: analog in {}x{}, analog out {}x{}, analog io {}, \
                      digital in {}x{}, digital out {}x{}, digital io {}",
                     config.index,
                     caps.analog_in_channels, caps.analog_in_buffer,
                     caps.analog_out_channels, caps.analog_out_buffer,
                     caps.analog_io_channels,
                     caps.digital_in_channels, caps.digital_in_buffer,
                     caps.digital_out_channels, caps.digital_out_buffer,
                     caps.digital_io_channels);
        }
    }
    Ok(())
}

fn main() -> dwf::Result<()> {
    env_logger::init();
    list(&*driver())
}
