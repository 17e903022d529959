//! Canonical byte encoding
//!
//! Records and call arguments share one length-prefixed format:
//!
//! | Type            | Encoding                                                   |
//! |-----------------|------------------------------------------------------------|
//! | `bool`          | 1 byte, 0 or 1                                             |
//! | `u16/u32/u64`   | little-endian                                              |
//! | `String`        | u32 byte length, UTF-8 bytes                               |
//! | `Vec<String>`   | u32 total byte length, then each string as above           |
//! | `Vec<u64>`      | u32 total byte length, then each value little-endian       |
//! | entity lists    | u32 element count, then each element's fields in order     |
//!
//! Field order, not field names, defines the layout, so the order of the
//! writes in each [`Encode`] impl is part of the storage format.

use crate::types::{
    Address, Allocation, BasisPoints, Payment, Proposal, ProposalVote, Team, TeamMember,
};
use crate::{Error, Result};
use bytes::{Buf, BufMut};

/// Append-only writer for the canonical format
#[derive(Debug, Default)]
pub struct ArgsWriter {
    buf: Vec<u8>,
}

impl ArgsWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bool
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Append a u16
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Append a u32
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append a u64
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Append a length-prefixed string
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u32_le(len_u32(value.len()));
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Append an address
    pub fn address(&mut self, value: &Address) -> &mut Self {
        self.string(value.as_str())
    }

    /// Append basis points
    pub fn basis_points(&mut self, value: BasisPoints) -> &mut Self {
        self.u16(value.get())
    }

    /// Append a string array prefixed by its total byte length
    pub fn string_array(&mut self, values: &[String]) -> &mut Self {
        let body: usize = values.iter().map(|v| 4 + v.len()).sum();
        self.buf.put_u32_le(len_u32(body));
        for value in values {
            self.string(value);
        }
        self
    }

    /// Append a u64 array prefixed by its total byte length
    pub fn u64_array(&mut self, values: &[u64]) -> &mut Self {
        self.buf.put_u32_le(len_u32(values.len() * 8));
        for value in values {
            self.buf.put_u64_le(*value);
        }
        self
    }

    /// Append a counted list of encodable items
    pub fn list<T: Encode>(&mut self, items: &[T]) -> &mut Self {
        self.u32(len_u32(items.len()));
        for item in items {
            item.encode_to(self);
        }
        self
    }

    /// Finish and take the bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn len_u32(len: usize) -> u32 {
    // Entity sizes are bounded by member and vote counts, far below 4 GiB.
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Cursor over canonical bytes
///
/// A failed read leaves the cursor where it was, so optional trailing
/// arguments can be probed without consuming input.
#[derive(Debug, Clone)]
pub struct ArgsReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ArgsReader<'a> {
    /// Read from the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// True when every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Codec(format!(
                "truncated {}: need {} bytes at offset {}, have {}",
                what,
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Run `read` and rewind if it fails
    fn atomic<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.offset;
        let result = read(self);
        if result.is_err() {
            self.offset = start;
        }
        result
    }

    /// Read a bool
    pub fn bool(&mut self) -> Result<bool> {
        self.atomic(|r| match r.take(1, "bool")?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Codec(format!("invalid bool byte {}", other))),
        })
    }

    /// Read a u16
    pub fn u16(&mut self) -> Result<u16> {
        let mut raw = self.take(2, "u16")?;
        Ok(raw.get_u16_le())
    }

    /// Read a u32
    pub fn u32(&mut self) -> Result<u32> {
        let mut raw = self.take(4, "u32")?;
        Ok(raw.get_u32_le())
    }

    /// Read a u64
    pub fn u64(&mut self) -> Result<u64> {
        let mut raw = self.take(8, "u64")?;
        Ok(raw.get_u64_le())
    }

    /// Read a length-prefixed string
    pub fn string(&mut self) -> Result<String> {
        self.atomic(|r| {
            let len = r.u32()? as usize;
            let raw = r.take(len, "string")?;
            String::from_utf8(raw.to_vec())
                .map_err(|e| Error::Codec(format!("invalid UTF-8 string: {}", e)))
        })
    }

    /// Read an address
    pub fn address(&mut self) -> Result<Address> {
        self.string().map(Address::new)
    }

    /// Read basis points, rejecting values above 100%
    pub fn basis_points(&mut self) -> Result<BasisPoints> {
        self.atomic(|r| {
            let raw = r.u16()?;
            BasisPoints::new(raw).map_err(|_| {
                Error::Codec(format!("basis points {} out of range", raw))
            })
        })
    }

    /// Read a string array
    pub fn string_array(&mut self) -> Result<Vec<String>> {
        self.atomic(|r| {
            let body_len = r.u32()? as usize;
            let body = r.take(body_len, "string array")?;
            let mut inner = ArgsReader::new(body);
            let mut values = Vec::new();
            while !inner.is_empty() {
                values.push(inner.string()?);
            }
            Ok(values)
        })
    }

    /// Read a u64 array
    pub fn u64_array(&mut self) -> Result<Vec<u64>> {
        self.atomic(|r| {
            let body_len = r.u32()? as usize;
            if body_len % 8 != 0 {
                return Err(Error::Codec(format!(
                    "u64 array length {} is not a multiple of 8",
                    body_len
                )));
            }
            let mut body = r.take(body_len, "u64 array")?;
            let mut values = Vec::with_capacity(body_len / 8);
            while body.has_remaining() {
                values.push(body.get_u64_le());
            }
            Ok(values)
        })
    }

    /// Read a counted list of decodable items
    pub fn list<T: Decode>(&mut self) -> Result<Vec<T>> {
        self.atomic(|r| {
            let count = r.u32()? as usize;
            // Every element takes at least one byte; cap the reservation by what is left.
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                items.push(T::decode_from(r)?);
            }
            Ok(items)
        })
    }

    /// Fail unless every byte has been consumed
    pub fn finish(&self) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::Codec(format!(
                "{} trailing bytes at offset {}",
                self.remaining(),
                self.offset
            )));
        }
        Ok(())
    }
}

/// Types with a canonical encoding
pub trait Encode {
    /// Append this value's fields
    fn encode_to(&self, writer: &mut ArgsWriter);

    /// Canonical bytes
    fn encode(&self) -> Vec<u8> {
        let mut writer = ArgsWriter::new();
        self.encode_to(&mut writer);
        writer.into_bytes()
    }
}

/// Types decodable from their canonical encoding
pub trait Decode: Sized {
    /// Read this value's fields
    fn decode_from(reader: &mut ArgsReader<'_>) -> Result<Self>;

    /// Decode a complete record, rejecting trailing bytes
    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ArgsReader::new(bytes);
        let value = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl Encode for TeamMember {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.address(&self.wallet)
            .string(&self.role)
            .basis_points(self.percentage)
            .u64(self.total_earned)
            .u64(self.last_paid_at);
    }
}

impl Decode for TeamMember {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            wallet: r.address()?,
            role: r.string()?,
            percentage: r.basis_points()?,
            total_earned: r.u64()?,
            last_paid_at: r.u64()?,
        })
    }
}

impl Encode for Team {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.u64(self.id)
            .address(&self.owner)
            .string(&self.name)
            .string(&self.description)
            .string(&self.currency)
            .string(&self.avatar)
            .string_array(&self.tags)
            .bool(self.is_active)
            .u64(self.created_at)
            .string(&self.pay_link_slug)
            .u64(self.total_received)
            .list(&self.members);
    }
}

impl Decode for Team {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.u64()?,
            owner: r.address()?,
            name: r.string()?,
            description: r.string()?,
            currency: r.string()?,
            avatar: r.string()?,
            tags: r.string_array()?,
            is_active: r.bool()?,
            created_at: r.u64()?,
            pay_link_slug: r.string()?,
            total_received: r.u64()?,
            members: r.list()?,
        })
    }
}

impl Encode for Payment {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.u64(self.id)
            .u64(self.team_id)
            .address(&self.payer)
            .u64(self.amount)
            .u64(self.timestamp)
            .string(&self.reference)
            .string(&self.memo);
    }
}

impl Decode for Payment {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.u64()?,
            team_id: r.u64()?,
            payer: r.address()?,
            amount: r.u64()?,
            timestamp: r.u64()?,
            reference: r.string()?,
            memo: r.string()?,
        })
    }
}

impl Encode for Allocation {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.address(&self.member)
            .string(&self.role)
            .basis_points(self.percentage);
    }
}

impl Decode for Allocation {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            member: r.address()?,
            role: r.string()?,
            percentage: r.basis_points()?,
        })
    }
}

impl Encode for ProposalVote {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.address(&self.voter)
            .bool(self.support)
            .basis_points(self.weight);
    }
}

impl Decode for ProposalVote {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            voter: r.address()?,
            support: r.bool()?,
            weight: r.basis_points()?,
        })
    }
}

impl Encode for Proposal {
    fn encode_to(&self, w: &mut ArgsWriter) {
        w.u64(self.id)
            .u64(self.team_id)
            .address(&self.creator)
            .string(&self.reason)
            .u64(self.end_time)
            .bool(self.executed)
            .u32(self.yes_votes)
            .u32(self.no_votes)
            .u64(self.created_at)
            .list(&self.allocations)
            .list(&self.votes);
    }
}

impl Decode for Proposal {
    fn decode_from(r: &mut ArgsReader<'_>) -> Result<Self> {
        Ok(Self {
            id: r.u64()?,
            team_id: r.u64()?,
            creator: r.address()?,
            reason: r.string()?,
            end_time: r.u64()?,
            executed: r.bool()?,
            yes_votes: r.u32()?,
            no_votes: r.u32()?,
            created_at: r.u64()?,
            allocations: r.list()?,
            votes: r.list()?,
        })
    }
}
