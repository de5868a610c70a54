//! Header and data checksums
//!
//! Both checksums are reflected CRCs computed an octet at a time from a
//! 256-entry table built at compile time:
//!
//! - header: 8 bits, polynomial x^8 + x^7 + 1, register preset to 0xFF
//! - data: 16 bits, CRC-CCITT x^16 + x^12 + x^5 + 1, register preset to 0xFFFF
//!
//! The transmitted value is the ones complement of the register. Running the
//! receiver over the covered octets plus the transmitted checksum leaves a
//! fixed residue, which is how incoming frames are checked.

/// Register left after a header and its correct checksum
pub const HEADER_CRC_RESIDUE: u8 = 0x55;

/// Register left after a payload and its correct checksum
pub const DATA_CRC_RESIDUE: u16 = 0xF0B8;

const HEADER_POLY: u8 = 0x81;
const DATA_POLY: u16 = 0x8408;

const fn header_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ HEADER_POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn data_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ DATA_POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static HEADER_TABLE: [u8; 256] = header_table();
static DATA_TABLE: [u16; 256] = data_table();

/// Feeds one octet into a header CRC register
#[inline]
pub fn header_crc_update(crc: u8, octet: u8) -> u8 {
    HEADER_TABLE[(crc ^ octet) as usize]
}

/// Feeds one octet into a data CRC register
#[inline]
pub fn data_crc_update(crc: u16, octet: u8) -> u16 {
    (crc >> 8) ^ DATA_TABLE[((crc ^ octet as u16) & 0xFF) as usize]
}

/// Runs the header register over `octets` from the preset value
pub fn header_crc_register(octets: &[u8]) -> u8 {
    octets.iter().fold(0xFF, |crc, &octet| header_crc_update(crc, octet))
}

/// Runs the data register over `octets` from the preset value
pub fn data_crc_register(octets: &[u8]) -> u16 {
    octets.iter().fold(0xFFFF, |crc, &octet| data_crc_update(crc, octet))
}

/// Checksum to transmit after the five header fields
pub fn header_crc(header: &[u8]) -> u8 {
    !header_crc_register(header)
}

/// Checksum to transmit after a payload, sent low octet first
pub fn data_crc(data: &[u8]) -> u16 {
    !data_crc_register(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn test_header_crc_token_vector() {
        // token from 0x05 to 0x10
        let header = [0x00u8, 0x10, 0x05, 0x00, 0x00];
        assert_eq!(header_crc_register(&header), 0x73);
        assert_eq!(header_crc(&header), 0x8C);
    }

    #[test]
    fn test_header_residue() {
        let with_crc = [0x00u8, 0x10, 0x05, 0x00, 0x00, 0x8C];
        assert_eq!(header_crc_register(&with_crc), HEADER_CRC_RESIDUE);

        let header = [0x06u8, 0x0A, 0x14, 0x00, 0x04];
        let mut with_crc = header.to_vec();
        with_crc.push(header_crc(&header));
        assert_eq!(header_crc_register(&with_crc), HEADER_CRC_RESIDUE);
    }

    #[test]
    fn test_table_matches_shift_register() {
        for octet in 0..=255u8 {
            let mut crc = 0xFFu8 ^ octet;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ HEADER_POLY } else { crc >> 1 };
            }
            assert_eq!(header_crc_update(0xFF, octet), crc);
        }
    }

    #[test]
    fn test_data_crc_vector() {
        let mut crc = 0xFFFF;
        crc = data_crc_update(crc, 0x01);
        assert_eq!(crc, 0x1E0E);
        crc = data_crc_update(crc, 0x22);
        assert_eq!(crc, 0xEB70);
        crc = data_crc_update(crc, 0x30);
        assert_eq!(crc, 0x42EF);
        assert_eq!(data_crc(&[0x01, 0x22, 0x30]), 0xBD10);
    }

    #[test]
    fn test_data_residue() {
        let with_crc = [0x01u8, 0x22, 0x30, 0x10, 0xBD];
        assert_eq!(data_crc_register(&with_crc), DATA_CRC_RESIDUE);
    }

    #[test]
    fn test_empty_data_crc() {
        assert_eq!(data_crc(&[]), 0x0000);
    }

    #[test]
    fn test_single_bit_flips_detected() {
        let mut rng = StdRng::seed_from_u64(0x4D53_5450);
        for _ in 0..200 {
            let len = rng.gen_range(1..=501);
            let mut data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let crc = data_crc(&data);
            data.extend_from_slice(&crc.to_le_bytes());

            let bit = rng.gen_range(0..len * 8);
            data[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(data_crc_register(&data), DATA_CRC_RESIDUE);
        }
    }
}
