//! Command header layout

use crate::chip::ChipDescriptor;
use crate::codec::{encode_into, Endian};
use crate::programmer::IcspFlags;

/// Bytes covered by the chip header
pub(crate) const HEADER_LEN: usize = 16;

/// Zero `frame` and write the chip header for `opcode`
///
/// `frame` must hold at least [`HEADER_LEN`] bytes.
pub(crate) fn write_header(
    frame: &mut [u8],
    opcode: u8,
    chip: &ChipDescriptor,
    icsp: IcspFlags,
) {
    frame.fill(0);
    frame[0] = opcode;
    frame[1] = chip.protocol_id;
    frame[2] = chip.variant;
    frame[3] = 0x00;
    frame[4] = (chip.data_memory_size >> 8) as u8;

    encode_into(&mut frame[5..7], chip.opts1, Endian::Little);
    // FIXME: byte 8 takes the high byte of opts1 before opts2 overwrites
    // byte 6. Firmware accepts this layout; kept bit-exact until the
    // intended field is known.
    frame[8] = frame[6];
    encode_into(&mut frame[6..8], chip.opts2, Endian::Little);
    encode_into(&mut frame[9..11], chip.opts3, Endian::Little);

    frame[11] = icsp.bits();
    encode_into(&mut frame[12..16], chip.code_memory_size, Endian::Little);
}
