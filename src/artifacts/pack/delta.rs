//! Copy/insert delta codec
//!
//! A delta encodes one blob relative to a base blob as a sequence of
//! `Copy { offset, length }` (reuse bytes from the base) and
//! `Insert { bytes }` (literal bytes) instructions. A delta is only ever
//! chosen by the pack writer when its compressed form is smaller than
//! compressing the object whole.
//!
//! ## Payload format
//!
//! A delta-encoded pack entry decompresses to `delta\n` followed by:
//!
//! ```text
//! BASE <40-hex-base-sha>\n
//! C <offset> <length>\n
//! I <length>\n<length raw bytes>\n
//! ...
//! ```
//!
//! The encoder is a naive full-scan matcher: for each target position it
//! searches the whole base for the longest shared run, accepts it as a
//! `Copy` when it reaches [`MIN_MATCH`] bytes, and otherwise emits a
//! single-byte `Insert`. Correct but not optimal; the decode side is the
//! load-bearing half.

use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;

/// Minimum shared run length accepted as a `Copy`
pub const MIN_MATCH: usize = 8;

/// Marker prefix distinguishing a delta pack entry from a whole object
pub const DELTA_MARKER: &[u8] = b"delta\n";

/// One delta instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaInstruction {
    /// Reuse `length` bytes of the base starting at `offset`
    Copy { offset: usize, length: usize },
    /// Splice in literal bytes
    Insert { bytes: Bytes },
}

/// Encode `target` against `base`.
pub fn encode(base: &[u8], target: &[u8]) -> Vec<DeltaInstruction> {
    let mut ops = Vec::new();
    let mut i = 0;

    while i < target.len() {
        let mut best_len = 0;
        let mut best_off = 0;

        for j in 0..base.len().saturating_sub(MIN_MATCH) {
            let mut len = 0;
            while i + len < target.len() && j + len < base.len() && target[i + len] == base[j + len]
            {
                len += 1;
            }
            if len > best_len {
                best_len = len;
                best_off = j;
            }
        }

        if best_len >= MIN_MATCH {
            ops.push(DeltaInstruction::Copy {
                offset: best_off,
                length: best_len,
            });
            i += best_len;
        } else {
            ops.push(DeltaInstruction::Insert {
                bytes: Bytes::copy_from_slice(&target[i..i + 1]),
            });
            i += 1;
        }
    }

    ops
}

/// Replay an instruction list against its base, reconstructing the exact
/// original target bytes.
pub fn apply(base: &[u8], ops: &[DeltaInstruction]) -> anyhow::Result<Bytes> {
    let mut out = Vec::new();

    for op in ops {
        match op {
            DeltaInstruction::Copy { offset, length } => {
                let end = offset
                    .checked_add(*length)
                    .filter(|end| *end <= base.len())
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "delta copy out of range: offset {offset} length {length} base {}",
                            base.len()
                        )
                    })?;
                out.extend_from_slice(&base[*offset..end]);
            }
            DeltaInstruction::Insert { bytes } => {
                out.extend_from_slice(bytes);
            }
        }
    }

    Ok(Bytes::from(out))
}

/// A serialized delta: the base it applies to plus the instruction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaDocument {
    pub base: ObjectId,
    pub ops: Vec<DeltaInstruction>,
}

impl DeltaDocument {
    pub fn new(base: ObjectId, ops: Vec<DeltaInstruction>) -> Self {
        DeltaDocument { base, ops }
    }

    pub fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut out = Vec::new();
        out.write_all(format!("BASE {}\n", self.base).as_bytes())?;

        for op in &self.ops {
            match op {
                DeltaInstruction::Copy { offset, length } => {
                    out.write_all(format!("C {offset} {length}\n").as_bytes())?;
                }
                DeltaInstruction::Insert { bytes } => {
                    out.write_all(format!("I {}\n", bytes.len()).as_bytes())?;
                    out.write_all(bytes)?;
                    out.push(b'\n');
                }
            }
        }

        Ok(Bytes::from(out))
    }

    /// Parse a delta payload (everything after the `delta\n` marker).
    /// Insert payloads are read length-prefixed, so arbitrary bytes
    /// (including newlines and invalid UTF-8) survive.
    pub fn deserialize(data: &[u8]) -> anyhow::Result<Self> {
        let mut pos = 0;

        let base_line = read_line(data, &mut pos).context("delta missing BASE line")?;
        let base_sha = base_line
            .strip_prefix("BASE ")
            .ok_or_else(|| anyhow::anyhow!("delta missing BASE prefix"))?;
        let base = ObjectId::try_parse(base_sha.trim().to_string())?;

        let mut ops = Vec::new();
        while pos < data.len() {
            let line = read_line(data, &mut pos).context("truncated delta instruction")?;

            if let Some(rest) = line.strip_prefix("C ") {
                let mut parts = rest.split(' ');
                let offset = parts
                    .next()
                    .and_then(|p| p.parse::<usize>().ok())
                    .ok_or_else(|| anyhow::anyhow!("bad copy offset"))?;
                let length = parts
                    .next()
                    .and_then(|p| p.parse::<usize>().ok())
                    .ok_or_else(|| anyhow::anyhow!("bad copy length"))?;
                ops.push(DeltaInstruction::Copy { offset, length });
            } else if let Some(rest) = line.strip_prefix("I ") {
                let length = rest
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("bad insert length"))?;
                if pos + length > data.len() {
                    anyhow::bail!("truncated insert payload");
                }
                let bytes = Bytes::copy_from_slice(&data[pos..pos + length]);
                pos += length;
                // consume the trailing newline after the payload
                if data.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
                ops.push(DeltaInstruction::Insert { bytes });
            } else {
                anyhow::bail!("unknown delta instruction: {line}");
            }
        }

        Ok(DeltaDocument { base, ops })
    }
}

fn read_line<'d>(data: &'d [u8], pos: &mut usize) -> Option<&'d str> {
    let rest = &data[*pos..];
    let end = rest.iter().position(|&b| b == b'\n')?;
    let line = std::str::from_utf8(&rest[..end]).ok()?;
    *pos += end + 1;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn oid() -> ObjectId {
        ObjectId::digest(b"base blob")
    }

    #[rstest]
    fn identical_base_and_target_become_one_copy() {
        let data = b"0123456789abcdef";
        let ops = encode(data, data);

        pretty_assertions::assert_eq!(
            ops,
            vec![DeltaInstruction::Copy {
                offset: 0,
                length: data.len()
            }]
        );
        pretty_assertions::assert_eq!(apply(data, &ops).unwrap().as_ref(), data.as_slice());
    }

    #[rstest]
    fn target_shorter_than_min_match_becomes_inserts() {
        let base = b"0123456789abcdef";
        let target = b"xyz";
        let ops = encode(base, target);

        assert_eq!(ops.len(), 3);
        assert!(ops
            .iter()
            .all(|op| matches!(op, DeltaInstruction::Insert { bytes } if bytes.len() == 1)));
        pretty_assertions::assert_eq!(apply(base, &ops).unwrap().as_ref(), target.as_slice());
    }

    #[rstest]
    fn empty_target_is_an_empty_script() {
        let ops = encode(b"some base", b"");
        assert!(ops.is_empty());
        assert!(apply(b"some base", &ops).unwrap().is_empty());
    }

    #[rstest]
    fn copy_past_base_end_is_rejected() {
        let ops = vec![DeltaInstruction::Copy {
            offset: 4,
            length: 10,
        }];
        assert!(apply(b"short", &ops).is_err());
    }

    #[rstest]
    fn document_round_trips_binary_inserts() {
        let doc = DeltaDocument::new(
            oid(),
            vec![
                DeltaInstruction::Copy {
                    offset: 3,
                    length: 12,
                },
                DeltaInstruction::Insert {
                    bytes: Bytes::from_static(b"\n\0\xffI 3\n"),
                },
                DeltaInstruction::Copy {
                    offset: 0,
                    length: 8,
                },
            ],
        );

        let serialized = doc.serialize().unwrap();
        let reparsed = DeltaDocument::deserialize(&serialized).unwrap();
        pretty_assertions::assert_eq!(reparsed, doc);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            base in prop::collection::vec(any::<u8>(), 0..200),
            target in prop::collection::vec(any::<u8>(), 0..200),
        ) {
            let ops = encode(&base, &target);
            let reconstructed = apply(&base, &ops).unwrap();
            prop_assert_eq!(reconstructed.as_ref(), target.as_slice());
        }

        #[test]
        fn document_round_trips_after_encode(
            base in prop::collection::vec(any::<u8>(), 0..120),
            target in prop::collection::vec(any::<u8>(), 0..120),
        ) {
            let doc = DeltaDocument::new(oid(), encode(&base, &target));
            let reparsed = DeltaDocument::deserialize(&doc.serialize().unwrap()).unwrap();
            prop_assert_eq!(reparsed, doc);
        }
    }
}
