//! Bit-field decoder for calorimeter cell identifiers.
//!
//! A readout describes its identifiers with a descriptor string such as
//! `"system:4,cryo:1,type:3,subtype:3,layer:8,eta:9,phi:10"`. Each comma-separated
//! entry is either `name:width` (placed right after the previous field) or
//! `name:offset:width` (placed at an explicit bit offset). A negative width marks a
//! signed, two's complement field.
//!
//! ```
//! use calo_positions::geometry::bitfield::BitFieldCoder;
//!
//! let coder = BitFieldCoder::parse("system:4,layer:8,eta:-9,phi:10")?;
//! let id = coder.encode(&[("system", 5), ("layer", 2), ("eta", -3), ("phi", 17)])?;
//! assert_eq!(coder.get(id, "eta"), Some(-3));
//! # Ok::<(), calo_positions::error::CaloError>(())
//! ```

use crate::error::{CaloError, CaloResult};
use crate::validation;
use std::fmt;

/// One named field of a cell identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFieldElement {
    name: String,
    offset: u32,
    width: u32,
    signed: bool,
}

impl BitFieldElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    fn mask(&self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            ((1u64 << self.width) - 1) << self.offset
        }
    }

    /// Extracts this field from `id`, sign-extending signed fields.
    pub fn value(&self, id: u64) -> i64 {
        let raw = (id & self.mask()) >> self.offset;
        if self.signed && self.width < 64 && raw & (1u64 << (self.width - 1)) != 0 {
            (raw as i64) - (1i64 << self.width)
        } else {
            raw as i64
        }
    }

    fn min_value(&self) -> i64 {
        if self.signed {
            if self.width == 64 {
                i64::MIN
            } else {
                -(1i64 << (self.width - 1))
            }
        } else {
            0
        }
    }

    fn max_value(&self) -> i64 {
        match (self.signed, self.width) {
            (true, 64) | (false, 64) | (false, 63) => i64::MAX,
            (true, w) => (1i64 << (w - 1)) - 1,
            (false, w) => (1i64 << w) - 1,
        }
    }

    /// Writes `value` into this field of `id`.
    pub fn store(&self, id: u64, value: i64) -> CaloResult<u64> {
        if value < self.min_value() || value > self.max_value() {
            return Err(CaloError::Configuration(format!(
                "value {} does not fit field '{}' ({}{} bits)",
                value,
                self.name,
                if self.signed { "signed " } else { "" },
                self.width
            )));
        }
        let bits = ((value as u64) << self.offset) & self.mask();
        Ok((id & !self.mask()) | bits)
    }
}

/// Decoder and encoder for one readout's identifier layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitFieldCoder {
    descriptor: String,
    fields: Vec<BitFieldElement>,
}

impl BitFieldCoder {
    /// Parses a descriptor string.
    ///
    /// # Errors
    ///
    /// Returns `CaloError::Configuration` for malformed entries, duplicate names,
    /// fields that overlap or run past bit 63.
    pub fn parse(descriptor: &str) -> CaloResult<Self> {
        let mut fields: Vec<BitFieldElement> = Vec::new();
        let mut next_offset = 0u32;
        let mut used = 0u64;

        for entry in descriptor.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (name, offset, width) = match parts.as_slice() {
                [name, width] => (*name, next_offset, parse_width(entry, width)?),
                [name, offset, width] => {
                    let offset = offset.parse::<u32>().map_err(|_| {
                        CaloError::Configuration(format!("invalid offset in id field '{}'", entry))
                    })?;
                    (*name, offset, parse_width(entry, width)?)
                }
                _ => {
                    return Err(CaloError::Configuration(format!(
                        "malformed id field '{}', expected name:width or name:offset:width",
                        entry
                    )))
                }
            };

            validation::is_not_empty(name)
                .map_err(|e| CaloError::Configuration(format!("id field '{}': {}", entry, e)))?;
            if fields.iter().any(|f| f.name == name) {
                return Err(CaloError::Configuration(format!(
                    "id field '{}' declared twice in '{}'",
                    name, descriptor
                )));
            }

            let (abs_width, signed) = (width.unsigned_abs(), width < 0);
            let end = offset
                .checked_add(abs_width)
                .filter(|end| *end <= 64)
                .ok_or_else(|| {
                    CaloError::Configuration(format!(
                        "id field '{}' at offset {} with width {} runs past the 64-bit identifier",
                        name, offset, abs_width
                    ))
                })?;

            let element = BitFieldElement {
                name: name.to_string(),
                offset,
                width: abs_width,
                signed,
            };
            if used & element.mask() != 0 {
                return Err(CaloError::Configuration(format!(
                    "id field '{}' overlaps another field in '{}'",
                    name, descriptor
                )));
            }
            used |= element.mask();
            next_offset = end;
            fields.push(element);
        }

        if fields.is_empty() {
            return Err(CaloError::Configuration(
                "id descriptor declares no fields".to_string(),
            ));
        }

        Ok(Self {
            descriptor: descriptor.to_string(),
            fields,
        })
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn fields(&self) -> &[BitFieldElement] {
        &self.fields
    }

    /// Position of `name` in [`fields`](Self::fields), for callers that decode the
    /// same field for every cell and want to skip the name lookup.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Value of field number `index`. Panics never; out-of-range indexes yield `None`.
    pub fn value_at(&self, id: u64, index: usize) -> Option<i64> {
        self.fields.get(index).map(|f| f.value(id))
    }

    pub fn get(&self, id: u64, name: &str) -> Option<i64> {
        self.index_of(name).and_then(|i| self.value_at(id, i))
    }

    /// Returns `id` with field `name` replaced by `value`.
    pub fn set(&self, id: u64, name: &str, value: i64) -> CaloResult<u64> {
        let index = self.index_of(name).ok_or_else(|| {
            CaloError::Configuration(format!("unknown id field '{}' in '{}'", name, self.descriptor))
        })?;
        self.fields[index].store(id, value)
    }

    /// Builds an identifier from `(field, value)` pairs; fields not listed are zero.
    pub fn encode(&self, values: &[(&str, i64)]) -> CaloResult<u64> {
        values
            .iter()
            .try_fold(0u64, |id, (name, value)| self.set(id, name, *value))
    }

    /// All fields of `id`, in declaration order.
    pub fn decode(&self, id: u64) -> Vec<(&str, i64)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.value(id)))
            .collect()
    }

    /// Human-readable `name:value` dump of `id`.
    pub fn describe(&self, id: u64) -> DecodedId<'_> {
        DecodedId { coder: self, id }
    }
}

fn parse_width(entry: &str, width: &str) -> CaloResult<i32> {
    let width = width
        .parse::<i32>()
        .map_err(|_| CaloError::Configuration(format!("invalid width in id field '{}'", entry)))?;
    validation::is_in_range(width.unsigned_abs(), 1..=64)
        .map_err(|e| CaloError::Configuration(format!("id field '{}': width {}", entry, e)))?;
    Ok(width)
}

/// Display adapter returned by [`BitFieldCoder::describe`].
pub struct DecodedId<'a> {
    coder: &'a BitFieldCoder,
    id: u64,
}

impl fmt::Display for DecodedId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.coder.decode(self.id).into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", name, value)?;
        }
        Ok(())
    }
}
