//! Object identifier (SHA-1 hash)
//!
//! Object ids are 40-character hexadecimal strings identifying every object
//! in the store. Loose objects live at `objects/<first-2-chars>/<remaining>`.

use crate::artifacts::objects::{OBJECT_ID_LENGTH, OBJECT_ID_RAW_LENGTH};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;

/// A validated 40-hex-character SHA-1 object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object id from a string.
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }
        Ok(Self(id))
    }

    /// Hash a serialized object (`"<kind> <len>\0" + payload`) into its id.
    pub fn digest(content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(content);
        ObjectId(format!("{:x}", hasher.finalize()))
    }

    /// Write the object id in binary form (20 bytes).
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        for i in (0..OBJECT_ID_LENGTH).step_by(2) {
            let byte = u8::from_str_radix(&self.0[i..i + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid hex digit"))?;
            writer.write_all(&[byte])?;
        }

        Ok(())
    }

    /// Read an object id from binary form (20 bytes).
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;

        let mut hex40 = String::with_capacity(OBJECT_ID_LENGTH);
        for byte in raw {
            hex40.push_str(&format!("{byte:02x}"));
        }

        Self::try_parse(hex40)
    }

    /// Loose-storage path: `XX/YYYY...` split after the first two chars.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// First 7 characters, for display.
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(7).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0000000000000000000000000000000000000000")]
    #[case("ce013625030ba8dba906f756967f9e9ca394464a")]
    fn parses_valid_ids(#[case] hex: &str) {
        let oid = ObjectId::try_parse(hex.to_string()).unwrap();
        pretty_assertions::assert_eq!(oid.as_ref(), hex);
    }

    #[rstest]
    #[case("abc")]
    #[case("zz013625030ba8dba906f756967f9e9ca394464a")]
    #[case("")]
    fn rejects_invalid_ids(#[case] hex: &str) {
        assert!(ObjectId::try_parse(hex.to_string()).is_err());
    }

    #[rstest]
    fn binary_round_trip() {
        let oid = ObjectId::try_parse("ce013625030ba8dba906f756967f9e9ca394464a".into()).unwrap();

        let mut raw = Vec::new();
        oid.write_raw_to(&mut raw).unwrap();
        assert_eq!(raw.len(), OBJECT_ID_RAW_LENGTH);

        let back = ObjectId::read_raw_from(&mut raw.as_slice()).unwrap();
        pretty_assertions::assert_eq!(back, oid);
    }

    #[rstest]
    fn fan_out_path() {
        let oid = ObjectId::try_parse("ce013625030ba8dba906f756967f9e9ca394464a".into()).unwrap();
        pretty_assertions::assert_eq!(
            oid.to_path(),
            PathBuf::from("ce").join("013625030ba8dba906f756967f9e9ca394464a")
        );
    }
}
