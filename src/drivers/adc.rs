//! ADC collaborator and the counts->volts->line-voltage conversion chain
//! (`spec.md` §6). `read_channel` is a synchronous, bounded hardware
//! transaction (SPI) from the fast loop's point of view; the transport
//! itself is out of scope.

/// The four channels the core samples every fast-loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdcChannel {
    EmfU,
    EmfV,
    EmfW,
    VBus,
}

/// 12-bit unsigned ADC reads, one bounded transaction per channel.
pub trait AdcSource: Send {
    fn read_channel(&mut self, ch: AdcChannel) -> u16;
}

/// ADC reference voltage.
pub const V_REF: f32 = 3.3;
/// ADC full-scale code for a 12-bit converter.
pub const ADC_MAX_COUNTS: f32 = 4095.;
/// Resistive-divider attenuation ratio on the EMF/bus sense inputs.
pub const R_RATIO: f32 = 73.1 / 5.1;

/// `v_pin = counts * V_ref / 4095`.
pub fn counts_to_pin_volts(counts: u16) -> f32 {
    counts as f32 * V_REF / ADC_MAX_COUNTS
}

/// `v_line = v_pin * R_ratio`. Used for both phase EMF and `V_BUS`.
pub fn pin_volts_to_line_volts(v_pin: f32) -> f32 {
    v_pin * R_RATIO
}

/// Convenience: counts straight to line voltage.
pub fn counts_to_line_volts(counts: u16) -> f32 {
    pin_volts_to_line_volts(counts_to_pin_volts(counts))
}
