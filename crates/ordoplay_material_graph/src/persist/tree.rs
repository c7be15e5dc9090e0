// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tagged tree backend for the persistence capability.
//!
//! [`TreeWriter`] records every call as a named [`Field`]; [`TreeReader`]
//! replays them and checks that each read asks for the field that was
//! written at that position. The resulting [`DataValue`] is plain serde
//! data and can be stored as RON or bincode.

use super::{DataReader, DataWriter};
use crate::error::{MaterialError, Result};
use serde::{Deserialize, Serialize};

/// One persisted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// Unsigned integer
    Uint(u32),
    /// UTF-8 string
    String(String),
    /// Boolean
    Bool(bool),
    /// Float
    Float(f32),
    /// Nested structure
    Structure(Vec<Field>),
    /// Collection of elements
    Collection(Vec<Field>),
}

impl DataValue {
    fn describe(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Float(_) => "float",
            Self::Structure(_) => "structure",
            Self::Collection(_) => "collection",
        }
    }

    /// Encode as pretty-printed RON
    pub fn to_ron(&self) -> Result<String> {
        let config = ron::ser::PrettyConfig::default().struct_names(false);
        ron::ser::to_string_pretty(self, config).map_err(MaterialError::io)
    }

    /// Decode from RON
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(MaterialError::io)
    }

    /// Encode as bincode
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(MaterialError::io)
    }

    /// Decode from bincode
    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(MaterialError::io)
    }
}

/// A named value inside a structure or collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field value
    pub value: DataValue,
}

enum Frame {
    Structure { name: String, fields: Vec<Field> },
    Collection { name: String, len: usize, fields: Vec<Field> },
}

impl Frame {
    fn fields(&mut self) -> &mut Vec<Field> {
        match self {
            Self::Structure { fields, .. } | Self::Collection { fields, .. } => fields,
        }
    }
}

/// [`DataWriter`] that builds a [`DataValue`] tree
pub struct TreeWriter {
    stack: Vec<Frame>,
}

impl TreeWriter {
    /// Create a writer whose root is an empty structure
    pub fn new() -> Self {
        Self {
            stack: vec![Frame::Structure {
                name: String::new(),
                fields: Vec::new(),
            }],
        }
    }

    /// Close the root and return the tree
    pub fn finish(mut self) -> Result<DataValue> {
        match (self.stack.pop(), self.stack.is_empty()) {
            (Some(Frame::Structure { fields, .. }), true) => Ok(DataValue::Structure(fields)),
            _ => Err(MaterialError::Io(
                "unbalanced structure or collection at end of write".to_string(),
            )),
        }
    }

    fn push(&mut self, name: &str, value: DataValue) -> Result<()> {
        let frame = self
            .stack
            .last_mut()
            .ok_or_else(|| MaterialError::Io("write after end of root".to_string()))?;
        frame.fields().push(Field {
            name: name.to_string(),
            value,
        });
        Ok(())
    }
}

impl Default for TreeWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DataWriter for TreeWriter {
    fn write_uint(&mut self, name: &str, value: u32) -> Result<()> {
        self.push(name, DataValue::Uint(value))
    }

    fn write_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.push(name, DataValue::String(value.to_string()))
    }

    fn write_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.push(name, DataValue::Bool(value))
    }

    fn write_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.push(name, DataValue::Float(value))
    }

    fn begin_structure(&mut self, name: &str) -> Result<()> {
        self.stack.push(Frame::Structure {
            name: name.to_string(),
            fields: Vec::new(),
        });
        Ok(())
    }

    fn end_structure(&mut self) -> Result<()> {
        if self.stack.len() < 2 {
            return Err(MaterialError::Io("end_structure without begin_structure".to_string()));
        }
        match self.stack.pop() {
            Some(Frame::Structure { name, fields }) => self.push(&name, DataValue::Structure(fields)),
            _ => Err(MaterialError::Io("end_structure closes a collection".to_string())),
        }
    }

    fn begin_collection(&mut self, name: &str, len: usize) -> Result<()> {
        self.stack.push(Frame::Collection {
            name: name.to_string(),
            len,
            fields: Vec::with_capacity(len),
        });
        Ok(())
    }

    fn end_collection(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::Collection { name, len, fields }) => {
                if fields.len() != len {
                    return Err(MaterialError::Io(format!(
                        "collection '{name}' declared {len} element(s) but {} were written",
                        fields.len()
                    )));
                }
                self.push(&name, DataValue::Collection(fields))
            }
            Some(frame) => {
                self.stack.push(frame);
                Err(MaterialError::Io("end_collection closes a structure".to_string()))
            }
            None => Err(MaterialError::Io("end_collection without begin_collection".to_string())),
        }
    }
}

struct Cursor {
    name: String,
    is_collection: bool,
    fields: std::vec::IntoIter<Field>,
}

/// [`DataReader`] that replays a [`DataValue`] tree
pub struct TreeReader {
    stack: Vec<Cursor>,
}

impl TreeReader {
    /// Create a reader over a tree produced by [`TreeWriter::finish`]
    pub fn new(root: DataValue) -> Result<Self> {
        match root {
            DataValue::Structure(fields) => Ok(Self {
                stack: vec![Cursor {
                    name: String::new(),
                    is_collection: false,
                    fields: fields.into_iter(),
                }],
            }),
            other => Err(MaterialError::Io(format!(
                "root must be a structure, found a {}",
                other.describe()
            ))),
        }
    }

    fn next(&mut self, name: &str) -> Result<DataValue> {
        let cursor = self
            .stack
            .last_mut()
            .ok_or_else(|| MaterialError::Io("read after end of root".to_string()))?;
        let field = cursor.fields.next().ok_or_else(|| {
            MaterialError::Io(format!("missing field '{name}' in '{}'", cursor.name))
        })?;
        // Collection elements are positional; their names are not checked.
        if !cursor.is_collection && field.name != name {
            return Err(MaterialError::Io(format!(
                "expected field '{name}', found '{}'",
                field.name
            )));
        }
        Ok(field.value)
    }

    fn mismatch(name: &str, expected: &str, found: &DataValue) -> MaterialError {
        MaterialError::Io(format!(
            "field '{name}' should be a {expected}, found a {}",
            found.describe()
        ))
    }

    fn leave(&mut self, is_collection: bool) -> Result<()> {
        if self.stack.len() < 2 {
            return Err(MaterialError::Io("cannot leave the root structure".to_string()));
        }
        match self.stack.pop() {
            Some(mut cursor) if cursor.is_collection == is_collection => match cursor.fields.next() {
                Some(extra) => Err(MaterialError::Io(format!(
                    "unexpected field '{}' in '{}'",
                    extra.name, cursor.name
                ))),
                None => Ok(()),
            },
            Some(cursor) => {
                let name = cursor.name.clone();
                self.stack.push(cursor);
                Err(MaterialError::Io(format!("mismatched end of '{name}'")))
            }
            None => Err(MaterialError::Io("cannot leave the root structure".to_string())),
        }
    }
}

impl DataReader for TreeReader {
    fn read_uint(&mut self, name: &str) -> Result<u32> {
        match self.next(name)? {
            DataValue::Uint(value) => Ok(value),
            other => Err(Self::mismatch(name, "uint", &other)),
        }
    }

    fn read_string(&mut self, name: &str) -> Result<String> {
        match self.next(name)? {
            DataValue::String(value) => Ok(value),
            other => Err(Self::mismatch(name, "string", &other)),
        }
    }

    fn read_bool(&mut self, name: &str) -> Result<bool> {
        match self.next(name)? {
            DataValue::Bool(value) => Ok(value),
            other => Err(Self::mismatch(name, "bool", &other)),
        }
    }

    fn read_float(&mut self, name: &str) -> Result<f32> {
        match self.next(name)? {
            DataValue::Float(value) => Ok(value),
            other => Err(Self::mismatch(name, "float", &other)),
        }
    }

    fn begin_structure(&mut self, name: &str) -> Result<()> {
        match self.next(name)? {
            DataValue::Structure(fields) => {
                self.stack.push(Cursor {
                    name: name.to_string(),
                    is_collection: false,
                    fields: fields.into_iter(),
                });
                Ok(())
            }
            other => Err(Self::mismatch(name, "structure", &other)),
        }
    }

    fn end_structure(&mut self) -> Result<()> {
        self.leave(false)
    }

    fn begin_collection(&mut self, name: &str) -> Result<usize> {
        match self.next(name)? {
            DataValue::Collection(fields) => {
                let len = fields.len();
                self.stack.push(Cursor {
                    name: name.to_string(),
                    is_collection: true,
                    fields: fields.into_iter(),
                });
                Ok(len)
            }
            other => Err(Self::mismatch(name, "collection", &other)),
        }
    }

    fn end_collection(&mut self) -> Result<()> {
        self.leave(true)
    }
}
