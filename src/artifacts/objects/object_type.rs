use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Parse the `"<kind> <length>\0"` header off the front of a serialized
    /// object, returning the kind and the declared payload length. The
    /// declared length must be checked against the actual payload by the
    /// caller on every read.
    pub fn parse_header(data_reader: &mut impl BufRead) -> anyhow::Result<(ObjectType, usize)> {
        let mut object_type = Vec::new();
        data_reader.read_until(b' ', &mut object_type)?;

        let object_type = String::from_utf8(object_type)?;
        let object_type = ObjectType::try_from(object_type.trim())?;

        let mut size = Vec::new();
        data_reader.read_until(b'\0', &mut size)?;
        if size.pop() != Some(b'\0') {
            anyhow::bail!("Invalid object header: missing NUL terminator");
        }

        let size = String::from_utf8(size)?
            .parse::<usize>()
            .map_err(|_| anyhow::anyhow!("Invalid object header: bad declared length"))?;

        Ok((object_type, size))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            _ => Err(anyhow::anyhow!("Invalid object type: {value}")),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_header_with_declared_length() {
        let mut reader = Cursor::new(b"blob 6\0hello\n".to_vec());
        let (object_type, size) = ObjectType::parse_header(&mut reader).unwrap();

        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(size, 6);
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut reader = Cursor::new(b"tag 3\0abc".to_vec());
        assert!(ObjectType::parse_header(&mut reader).is_err());
    }

    #[test]
    fn rejects_missing_nul() {
        let mut reader = Cursor::new(b"blob 6".to_vec());
        assert!(ObjectType::parse_header(&mut reader).is_err());
    }
}
