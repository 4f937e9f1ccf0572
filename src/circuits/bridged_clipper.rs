//! Bridged-T diode clipper built on an R-type adaptor.
//!
//! ```text
//!   Vs --[Rs]--(0)--C1--(1)--C2--(2)----+---- out
//!               |        |       |      |
//!               |      [Rleg]    |    D1 D2
//!               |        |       |      |
//!               |       gnd      |     gnd
//!               +-------[Rb]-----+
//! ```
//!
//! No series/parallel decomposition exists for the bridge, so all five
//! elements hang off a single [`WireJunction`] whose scattering matrix comes
//! from nodal analysis. The diode pair across the output is the tree root.
//! The tone control sets the leg resistance, which moves the notch of the
//! bridged-T network.

use log::debug;

use super::{drive_gains, find_control, Circuit, Control};
use crate::components::DiodeParams;
use crate::config::IterationPolicy;
use crate::error::{require_sample_rate, Result};
use crate::wdf::{
    process_tree, Capacitor, DiodePairRoot, PortTerminals, ResistiveVoltageSource, Resistor, RtypeAdaptor, WdfPort,
    WdfRoot, WireJunction,
};

const SOURCE_RESISTANCE: f64 = 1.0e3;
const C1: f64 = 22.0e-9;
const C2: f64 = 22.0e-9;
const BRIDGE: f64 = 47.0e3;

const CONTROLS: &[Control] = &[
    Control::new("drive", 0.0, 1.0, 0.5),
    Control::new("tone", 0.0, 1.0, 0.5),
];

type Elements = (ResistiveVoltageSource, Capacitor, Capacitor, Resistor, Resistor);
type Tree = RtypeAdaptor<1, 5, Elements, WireJunction<5>>;

#[derive(Debug, Clone)]
struct Channel {
    tree: Tree,
    root: DiodePairRoot,
}

/// Leg resistance for a tone setting, 100 Ω to 10 kΩ on a log taper.
fn leg_resistance(tone: f64) -> f64 {
    100.0 * 100.0f64.powf(tone.clamp(0.0, 1.0))
}

fn build_channel(tone: f64) -> Result<Channel> {
    // Up port first, then the children in tuple order.
    let terminals = [
        PortTerminals::to_ground(2),
        PortTerminals::to_ground(0),
        PortTerminals::between(0, 1),
        PortTerminals::between(1, 2),
        PortTerminals::between(0, 2),
        PortTerminals::to_ground(1),
    ];
    let junction = WireJunction::new(3, &terminals)?;
    let elements = (
        ResistiveVoltageSource::new(SOURCE_RESISTANCE),
        Capacitor::new(C1),
        Capacitor::new(C2),
        Resistor::new(BRIDGE),
        Resistor::new(leg_resistance(tone)),
    );
    Ok(Channel {
        tree: RtypeAdaptor::new(elements, junction)?,
        root: DiodePairRoot::new(DiodeParams::default()),
    })
}

/// Bridged-T clipper with drive and tone.
#[derive(Debug, Clone)]
pub struct BridgedClipper {
    channels: Vec<Channel>,
    input_gain: f64,
    output_gain: f64,
    tone: f64,
}

impl BridgedClipper {
    pub fn new(channels: usize) -> Result<Self> {
        let tone = CONTROLS[1].default;
        let channel = build_channel(tone)?;
        let (input_gain, output_gain) = drive_gains(CONTROLS[0].default);
        Ok(Self {
            channels: vec![channel; channels.max(1)],
            input_gain,
            output_gain,
            tone,
        })
    }

    pub fn set_drive(&mut self, drive: f64) {
        (self.input_gain, self.output_gain) = drive_gains(drive);
    }

    /// Set the tone (0..1). Rebuilds the scattering matrix of every channel.
    pub fn set_tone(&mut self, tone: f64) {
        let tone = CONTROLS[1].clamp(tone);
        if tone == self.tone {
            return;
        }
        self.tone = tone;
        let r = leg_resistance(tone);
        for channel in &mut self.channels {
            channel.tree.ports.4.set_resistance(r);
            channel.tree.propagate_impedance();
        }
    }

    /// Port resistance the junction presents to the diode pair.
    pub fn port_resistance(&self) -> f64 {
        self.channels[0].tree.port_resistance()
    }
}

impl Circuit for BridgedClipper {
    fn name(&self) -> &'static str {
        "bridged-clipper"
    }

    fn prepare(&mut self, sample_rate: f64) -> Result<()> {
        require_sample_rate(sample_rate)?;
        for channel in &mut self.channels {
            channel.tree.prepare(sample_rate);
        }
        self.reset();
        debug!(
            "bridged-clipper: prepared at {sample_rate} Hz, diode port {:.1} ohm",
            self.port_resistance()
        );
        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.tree.reset();
            channel.root.reset();
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        let Some(ch) = self.channels.get_mut(channel) else {
            return 0.0;
        };
        ch.tree.ports.0.set_voltage(self.input_gain * input);
        process_tree(&mut ch.tree, &mut ch.root);
        self.output_gain * ch.root.voltage()
    }

    fn set_control(&mut self, name: &str, value: f64) -> Result<()> {
        let control = find_control(CONTROLS, self.name(), name)?;
        let value = control.clamp(value);
        match control.name {
            "drive" => self.set_drive(value),
            _ => self.set_tone(value),
        }
        Ok(())
    }

    fn controls(&self) -> &'static [Control] {
        CONTROLS
    }

    fn set_iteration_policy(&mut self, policy: IterationPolicy) {
        for channel in &mut self.channels {
            channel.root.set_policy(policy);
        }
    }
}
