use std::fmt::Display;

use bytes::{Buf, BufMut};
use serde_derive::{Deserialize, Serialize};

use crate::common::RecordId;
use crate::error::{Error, Result};

/// Maximum number of bytes stored for a string field.
pub const STRING_LEN: usize = 128;

/// A fixed-width field type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Str,
}

impl Type {
    /// Number of bytes a field of this type occupies on a page.
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Str => 4 + STRING_LEN,
        }
    }

    /// Decodes one field of this type from the front of buf.
    pub fn parse(&self, buf: &mut &[u8]) -> Result<Field> {
        if buf.remaining() < self.len() {
            return Err(Error::Value(format!("{} bytes left, {:?} field needs {}", buf.remaining(), self, self.len())));
        }
        match self {
            Type::Int => Ok(Field::Int(buf.get_i32())),
            Type::Str => {
                let len = (buf.get_u32() as usize).min(STRING_LEN);
                let s = String::from_utf8(buf[..len].to_vec())?;
                buf.advance(STRING_LEN);
                Ok(Field::Str(s))
            }
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Str => write!(f, "STRING"),
        }
    }
}

/// A field value. Ordered and hashable so it can serve as a group key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn get_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Str(_) => Type::Str,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Str(_) => None,
        }
    }

    /// Encodes the field in its fixed-width form. Strings longer than STRING_LEN bytes are
    /// truncated at a character boundary.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        match self {
            Field::Int(v) => buf.put_i32(*v),
            Field::Str(s) => {
                let mut len = s.len().min(STRING_LEN);
                while !s.is_char_boundary(len) {
                    len -= 1;
                }
                buf.put_u32(len as u32);
                buf.put_slice(&s.as_bytes()[..len]);
                buf.put_bytes(0, STRING_LEN - len);
            }
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Str(s.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TdItem {
    pub field_type: Type,
    pub name: Option<String>,
}

/// The schema of a tuple: an ordered list of typed, optionally named fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(types: &[Type], names: &[&str]) -> Self {
        let items = types
            .iter()
            .enumerate()
            .map(|(i, t)| TdItem { field_type: *t, name: names.get(i).map(|n| n.to_string()) })
            .collect();
        Self { items }
    }

    pub fn from_types(types: &[Type]) -> Self {
        Self::new(types, &[])
    }

    pub fn from_items(items: Vec<TdItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Result<Type> {
        self.items
            .get(i)
            .map(|item| item.field_type)
            .ok_or_else(|| Error::Value(format!("Field index {} out of range", i)))
    }

    pub fn field_name(&self, i: usize) -> Result<Option<&str>> {
        self.items
            .get(i)
            .map(|item| item.name.as_deref())
            .ok_or_else(|| Error::Value(format!("Field index {} out of range", i)))
    }

    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
            .ok_or_else(|| Error::Value(format!("Unknown field {}", name)))
    }

    /// Size in bytes of a tuple with this schema.
    pub fn size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.len()).sum()
    }

    /// Concatenates two schemas.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> TupleDesc {
        Self { items: a.items.iter().chain(b.items.iter()).cloned().collect() }
    }
}

/// Schemas are equal when their field types are; names are ignored.
impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self.items.iter().zip(other.items.iter()).all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Display for TupleDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<String> = self.items
            .iter()
            .map(|item| format!("{}({})", item.field_type, item.name.as_deref().unwrap_or("null")))
            .collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// A row, plus the record id of the slot it was read from, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields, record_id: None }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> Result<&Field> {
        self.fields
            .get(i)
            .ok_or_else(|| Error::Value(format!("Field index {} out of range", i)))
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> Result<()> {
        match self.fields.get_mut(i) {
            Some(f) => {
                *f = field;
                Ok(())
            }
            None => Err(Error::Value(format!("Field index {} out of range", i))),
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Returns true if the field types line up with desc.
    pub fn matches(&self, desc: &TupleDesc) -> bool {
        self.fields.len() == desc.num_fields()
            && self.fields.iter().zip(desc.items()).all(|(f, item)| f.get_type() == item.field_type)
    }

    pub fn serialize(&self, desc: &TupleDesc, buf: &mut impl BufMut) -> Result<()> {
        if !self.matches(desc) {
            return Err(Error::SchemaMismatch(format!("Tuple {} does not match ({})", self, desc)));
        }
        self.fields.iter().for_each(|f| f.serialize(buf));
        Ok(())
    }

    pub fn deserialize(desc: &TupleDesc, mut buf: &[u8]) -> Result<Self> {
        let fields = desc.items()
            .iter()
            .map(|item| item.field_type.parse(&mut buf))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(|f| f.to_string()).collect();
        write!(f, "{}", fields.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc() -> Result<()> {
        let desc = TupleDesc::new(&[Type::Int, Type::Str], &["id", "name"]);
        assert_eq!(2, desc.num_fields());
        assert_eq!(4 + 4 + STRING_LEN, desc.size());
        assert_eq!(1, desc.field_index("name")?);
        assert!(desc.field_index("missing").is_err());
        assert_eq!(Some("id"), desc.field_name(0)?);

        // Names do not take part in equality.
        assert_eq!(desc, TupleDesc::from_types(&[Type::Int, Type::Str]));
        assert_ne!(desc, TupleDesc::from_types(&[Type::Str, Type::Int]));

        let merged = TupleDesc::merge(&desc, &TupleDesc::from_types(&[Type::Int]));
        assert_eq!(3, merged.num_fields());
        assert_eq!(Type::Int, merged.field_type(2)?);
        Ok(())
    }

    #[test]
    fn test_tuple_encoding() -> Result<()> {
        let desc = TupleDesc::from_types(&[Type::Int, Type::Str, Type::Int]);
        let tuple = Tuple::new(vec![Field::Int(-7), "feather".into(), Field::Int(i32::MAX)]);

        let mut buf = Vec::new();
        tuple.serialize(&desc, &mut buf)?;
        assert_eq!(desc.size(), buf.len());
        assert_eq!(tuple, Tuple::deserialize(&desc, &buf)?);

        let wrong = TupleDesc::from_types(&[Type::Int]);
        assert!(matches!(tuple.serialize(&wrong, &mut buf), Err(Error::SchemaMismatch(_))));
        Ok(())
    }

    #[test]
    fn test_long_string_truncated() -> Result<()> {
        let desc = TupleDesc::from_types(&[Type::Str]);
        let long = "é".repeat(STRING_LEN);
        let mut buf = Vec::new();
        Tuple::new(vec![Field::Str(long)]).serialize(&desc, &mut buf)?;

        let decoded = Tuple::deserialize(&desc, &buf)?;
        match decoded.field(0)? {
            Field::Str(s) => {
                assert_eq!(STRING_LEN, s.len());
                assert!(s.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected field {:?}", other),
        }
        Ok(())
    }
}
