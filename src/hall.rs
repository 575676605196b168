//! Hall-effect sensor decoding (`spec.md` §4.B). `hall_to_sector` is total
//! and pure; everything else in this module is the thin adapter that reads
//! the three digital lines through the `HallInputs` collaborator trait.

use crate::types::Sector;

/// Decode a 3-bit Hall pattern (bit 0 = Hall A, bit 1 = Hall B, bit 2 =
/// Hall C) into a commutation sector. `0b000` and `0b111` are physically
/// impossible for a healthy sensor triad and decode to `Sector::Invalid`.
pub fn hall_to_sector(bits: u8) -> Sector {
    match bits & 0b111 {
        0b001 => Sector::S0,
        0b011 => Sector::S1,
        0b010 => Sector::S2,
        0b110 => Sector::S3,
        0b100 => Sector::S4,
        0b101 => Sector::S5,
        _ => Sector::Invalid,
    }
}

/// External collaborator: three digital Hall input lines (`spec.md` §6).
/// Borrowed read-only by the decoder/estimator; owned and wired up by the
/// runtime shell.
pub trait HallInputs: Send {
    /// Read the current 3-bit Hall pattern (bit0=A, bit1=B, bit2=C).
    fn read_bits(&mut self) -> u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_table_matches_spec() {
        assert_eq!(hall_to_sector(0b001), Sector::S0);
        assert_eq!(hall_to_sector(0b011), Sector::S1);
        assert_eq!(hall_to_sector(0b010), Sector::S2);
        assert_eq!(hall_to_sector(0b110), Sector::S3);
        assert_eq!(hall_to_sector(0b100), Sector::S4);
        assert_eq!(hall_to_sector(0b101), Sector::S5);
    }

    #[test]
    fn invalid_iff_all_zero_or_all_one() {
        for bits in 0u8..8 {
            let expect_invalid = matches!(bits, 0b000 | 0b111);
            assert_eq!(hall_to_sector(bits).is_valid(), !expect_invalid, "bits={bits:#05b}");
        }
    }
}
