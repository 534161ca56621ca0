use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dwf::{
    AcquisitionConfiguration, AnalogOutNode, ChannelConfiguration, Driver, EnumFilter, Function,
    InstrumentState, TriggerSource,
};

const FILENAME: &str = "test.data";
const SAMPLES: usize = 4096;

#[cfg(feature = "hardware")]
fn driver() -> Arc<dwf::LibDwf> {
    Arc::new(dwf::LibDwf::new())
}

#[cfg(not(feature = "hardware"))]
fn driver() -> Arc<dwf::SimDriver> {
    Arc::new(dwf::SimDriver::default())
}

/// Plays a 1 kHz sine on the first output and captures it on the first input.
fn capture<D: Driver>(driver: Arc<D>) -> Result<Vec<f64>, Box<dyn Error>> {
    let devices = dwf::enumerate(&*driver, EnumFilter::All)?;
    let device = devices.iter().find(|device| !device.opened).ok_or("no free device")?;
    log::info!("using {} ({})", device.name, device.serial);
    let session = device.open(driver.clone(), None)?;

    let analog_out = session.analog_out();
    analog_out.node_enable_set(0, AnalogOutNode::Carrier, true)?;
    analog_out.node_function_set(0, AnalogOutNode::Carrier, Function::Sine)?;
    analog_out.node_frequency_set(0, AnalogOutNode::Carrier, 1e3)?;
    analog_out.node_amplitude_set(0, AnalogOutNode::Carrier, 1.0)?;
    analog_out.configure(Some(0), true)?;

    let analog_in = session.analog_in();
    analog_in.apply(&AcquisitionConfiguration {
        frequency: 1e6,
        buffer_size: Some(SAMPLES),
        channels: vec![ChannelConfiguration::default()],
        trigger_source: TriggerSource::DetectorAnalogIn,
        trigger_auto_timeout: 1.0,
        ..Default::default()
    })?;
    analog_in.configure(false, true)?;
    while analog_in.status(true)? != InstrumentState::Done {
        std::thread::sleep(Duration::from_millis(1));
    }
    if analog_in.status_auto_triggered()? {
        log::warn!("no trigger seen, the capture started on timeout");
    }
    let samples = analog_in.status_data(0, SAMPLES)?;
    analog_out.reset(None)?;
    Ok(samples)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let samples = capture(driver())?;
    let (min, max) = samples.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &sample| (min.min(sample), max.max(sample)));
    println!("got {} samples between {:.3} V and {:.3} V, first 8: {:.3?}",
             samples.len(), min, max, &samples[..8.min(samples.len())]);
    std::fs::write(FILENAME, bytemuck::cast_slice::<f64, u8>(&samples))?;
    println!("saved {} samples as little-endian f64 to {}", samples.len(), FILENAME);
    Ok(())
}
