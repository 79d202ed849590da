//! Fuse codec
//!
//! Configuration fields (fuses, lock bytes, config words, user IDs) are
//! declared per chip as an ordered list of [`FuseField`]s. Fields sharing an
//! opcode form a group that travels as one payload, each field sitting at
//! its declared offset. Values are little-endian.
//!
//! Reading emits every field through a [`FuseSink`]; writing pulls every
//! field from a [`FuseSource`], then writes each group and checks the
//! programmer's echo of it.

use std::collections::BTreeMap;

use crate::block::VerifyOutcome;
use crate::chip::{check_fuse_order, FuseField};
use crate::codec::{decode, encode_into, Endian, MAX_WIDTH};
use crate::error::{Error, Result};
use crate::protocol::{FuseWriteFrame, MSG_BUF_SIZE, PAYLOAD_OFFSET};

/// Raw fuse access provided by the protocol session
pub trait FuseIo {
    /// Read the `buf.len()` byte payload of the group with `opcode`
    fn read_fuses(&mut self, opcode: u8, buf: &mut [u8]) -> Result<()>;

    /// Write the payload of the group read with `opcode`
    fn write_fuses(&mut self, opcode: u8, payload: &[u8]) -> Result<()>;

    /// Ask the programmer to echo back the payload just written
    fn confirm_fuses(&mut self, opcode: u8, payload: &[u8], echo: &mut [u8]) -> Result<()>;
}

/// Named value lookup used when writing or verifying fuses
pub trait FuseSource {
    /// Value of the field `name`, if present
    ///
    /// A value that is present but malformed is an error.
    fn read_named_int(&self, name: &str) -> Result<Option<u32>>;
}

/// Named value store filled when reading fuses
pub trait FuseSink {
    /// Store the value of field `name`
    fn write_named_int(&mut self, name: &str, value: u32);
}

impl FuseSource for BTreeMap<String, u32> {
    fn read_named_int(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.get(name).copied())
    }
}

impl FuseSink for BTreeMap<String, u32> {
    fn write_named_int(&mut self, name: &str, value: u32) {
        self.insert(name.to_string(), value);
    }
}

/// Fields sharing one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseGroup<'a> {
    /// Opcode used to read the group
    pub opcode: u8,
    /// Member fields, in table order
    pub fields: &'a [FuseField],
    /// Payload length (sum of member sizes)
    pub len: usize,
}

impl FuseGroup<'_> {
    /// Build the group payload from `source`
    pub fn pack<S: FuseSource + ?Sized>(&self, source: &S) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; self.len];
        for field in self.fields {
            let value = source
                .read_named_int(&field.name)?
                .ok_or_else(|| Error::FuseNotFound(field.name.clone()))?;
            let start = field.offset as usize;
            encode_into(
                &mut payload[start..start + field.size as usize],
                value,
                Endian::Little,
            );
        }
        Ok(payload)
    }

    /// Decode every member field from `payload`
    pub fn unpack<'p>(&'p self, payload: &'p [u8]) -> impl Iterator<Item = (&'p FuseField, u32)> {
        let fields: &'p [FuseField] = self.fields;
        fields.iter().map(move |field| {
            let start = field.offset as usize;
            let value = decode(&payload[start..start + field.size as usize], Endian::Little);
            (field, value)
        })
    }
}

/// Split a fuse table into opcode groups
///
/// Fails with [`Error::DatabaseInvariantViolation`] when the table is not
/// ordered by opcode or a field does not fit its group payload.
pub fn group_fields(fields: &[FuseField]) -> Result<Vec<FuseGroup<'_>>> {
    check_fuse_order(fields)?;

    let mut groups = Vec::new();
    let mut start = 0;
    while start < fields.len() {
        let opcode = fields[start].opcode;
        let count = fields[start..]
            .iter()
            .take_while(|f| f.opcode == opcode)
            .count();
        let members = &fields[start..start + count];
        let len: usize = members.iter().map(|f| f.size as usize).sum();

        if len > MSG_BUF_SIZE - PAYLOAD_OFFSET {
            return Err(Error::DatabaseInvariantViolation(format!(
                "opcode 0x{:02X} payload of {} bytes is too large",
                opcode, len
            )));
        }
        for field in members {
            let size = field.size as usize;
            if size == 0 || size > MAX_WIDTH || field.offset as usize + size > len {
                return Err(Error::DatabaseInvariantViolation(format!(
                    "field '{}' ({} bytes at offset {}) does not fit the {} byte payload of opcode 0x{:02X}",
                    field.name, field.size, field.offset, len, opcode
                )));
            }
        }

        groups.push(FuseGroup {
            opcode,
            fields: members,
            len,
        });
        start += count;
    }

    Ok(groups)
}

/// Read every field and emit it to `sink`
pub fn read<F, S>(io: &mut F, fields: &[FuseField], sink: &mut S) -> Result<()>
where
    F: FuseIo + ?Sized,
    S: FuseSink + ?Sized,
{
    for group in group_fields(fields)? {
        let mut payload = vec![0u8; group.len];
        io.read_fuses(group.opcode, &mut payload)?;
        log::debug!("Fuses 0x{:02X}: {:02X?}", group.opcode, payload);

        for (field, value) in group.unpack(&payload) {
            sink.write_named_int(&field.name, value);
        }
    }
    Ok(())
}

/// Pack every group from `source` ahead of writing
///
/// Fails without touching the chip when a value is missing or an opcode
/// has no write framing.
pub fn pack_all<S>(fields: &[FuseField], source: &S) -> Result<Vec<(u8, Vec<u8>)>>
where
    S: FuseSource + ?Sized,
{
    let mut packed = Vec::new();
    for group in group_fields(fields)? {
        let frame = FuseWriteFrame::for_opcode(group.opcode)?;
        if group.len > frame.capacity() {
            return Err(Error::DatabaseInvariantViolation(format!(
                "opcode 0x{:02X} payload of {} bytes exceeds its {} byte write frame",
                group.opcode,
                group.len,
                frame.capacity()
            )));
        }
        packed.push((group.opcode, group.pack(source)?));
    }
    Ok(packed)
}

/// Write groups produced by [`pack_all`], confirming each one
///
/// A differing echo fails with [`Error::VerifyMismatch`].
pub fn write_packed<F>(io: &mut F, packed: Vec<(u8, Vec<u8>)>) -> Result<()>
where
    F: FuseIo + ?Sized,
{
    for (opcode, payload) in packed {
        log::debug!("Writing fuses 0x{:02X}: {:02X?}", opcode, payload);
        io.write_fuses(opcode, &payload)?;

        let mut echo = vec![0u8; payload.len()];
        io.confirm_fuses(opcode, &payload, &mut echo)?;
        if echo != payload {
            return Err(Error::VerifyMismatch {
                opcode,
                expected: payload,
                actual: echo,
            });
        }
    }
    Ok(())
}

/// Write every field from `source`
///
/// All groups are packed and checked before the first write, so a missing
/// value or an unwritable opcode leaves the chip untouched.
pub fn write<F, S>(io: &mut F, fields: &[FuseField], source: &S) -> Result<()>
where
    F: FuseIo + ?Sized,
    S: FuseSource + ?Sized,
{
    let packed = pack_all(fields, source)?;
    write_packed(io, packed)
}

/// Compare every field against `source`
///
/// The mismatch offset is the index of the first differing field.
pub fn verify<F, S>(io: &mut F, fields: &[FuseField], source: &S) -> Result<VerifyOutcome>
where
    F: FuseIo + ?Sized,
    S: FuseSource + ?Sized,
{
    let mut index = 0;
    for group in group_fields(fields)? {
        let mut payload = vec![0u8; group.len];
        io.read_fuses(group.opcode, &mut payload)?;

        for (field, actual) in group.unpack(&payload) {
            let expected = source
                .read_named_int(&field.name)?
                .ok_or_else(|| Error::FuseNotFound(field.name.clone()))?;
            if expected != actual {
                return Ok(VerifyOutcome::Mismatch {
                    offset: index,
                    expected,
                    actual,
                });
            }
            index += 1;
        }
    }
    Ok(VerifyOutcome::Match)
}
