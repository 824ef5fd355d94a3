//! Wire format for [`crate::program::ProgramFragment`]s.
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! u32                          function count N
//! N * {
//!   u32                        byte offset of this function's body (back-patched)
//!   u32                        name length
//!   name bytes
//!   varint                     parameter count
//!   varint                     return count
//! }
//! N * {
//!   u16                        body length in bytes (back-patched)
//!   body: sequence of {
//!     u16                      opcode
//!     per-opcode immediates (see `InstructionMetadata::write_immediates`)
//!   }
//! }
//! ```
//!
//! All function declarations are written (and read) before any function
//! body, so an instruction whose immediates reference another function
//! by name can resolve that name against every declared function,
//! including ones declared later in program order and the function's own
//! name (direct recursion) — see [`SerializeContext`]/[`DeserializeContext`].

pub mod varint;

use hashbrown::HashMap;

use crate::error::DeserializeError;
use crate::function::Function;
use crate::instruction::{InstructionSet, OpCode};
use crate::program::{FunctionId, ProgramFragment};
use crate::value::Value;

/// A byte sink. Implemented for `Vec<u8>`; instructions overriding
/// [`crate::instruction::Instruction::write_immediates`] only need this
/// much of [`Writer`].
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> bool;
}

/// A byte source, the reading counterpart of [`ByteSink`].
pub trait ByteSource {
    fn read_bytes(&mut self, len: usize) -> Option<Vec<u8>>;
}

/// A sink that additionally supports reserving space for a value to be
/// patched in once it is known (function body offsets and lengths).
pub trait Writer: ByteSink {
    fn cursor(&self) -> usize;
    /// Reserves `len` zero bytes, returning the cursor position they
    /// start at, so they can be overwritten later via `write_at`.
    fn allocate(&mut self, len: usize) -> usize;
    fn write_at(&mut self, cursor: usize, bytes: &[u8]) -> bool;
}

/// The reading counterpart of [`Writer`].
pub trait Reader: ByteSource {
    fn cursor(&self) -> usize;
    fn remaining(&self) -> usize;
}

/// A `Vec<u8>`-backed [`Writer`].
#[derive(Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl ByteSink for ByteWriter {
    fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        self.bytes.extend_from_slice(bytes);
        true
    }
}

impl Writer for ByteWriter {
    fn cursor(&self) -> usize {
        self.bytes.len()
    }

    fn allocate(&mut self, len: usize) -> usize {
        let at = self.bytes.len();
        self.bytes.resize(at + len, 0);
        at
    }

    fn write_at(&mut self, cursor: usize, bytes: &[u8]) -> bool {
        if cursor + bytes.len() > self.bytes.len() {
            return false;
        }
        self.bytes[cursor..cursor + bytes.len()].copy_from_slice(bytes);
        true
    }
}

/// A `&[u8]`-backed [`Reader`].
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, cursor: 0 }
    }
}

impl ByteSource for ByteReader<'_> {
    fn read_bytes(&mut self, len: usize) -> Option<Vec<u8>> {
        if self.cursor + len > self.bytes.len() {
            return None;
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Some(slice.to_vec())
    }
}

impl Reader for ByteReader<'_> {
    fn cursor(&self) -> usize {
        self.cursor
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }
}

/// Context available to [`crate::instruction::Instruction::write_immediates`]
/// overrides: the byte sink plus a way to resolve a function by id back
/// to the name it was declared under, for instructions whose immediates
/// are themselves function references.
pub struct SerializeContext<'a> {
    pub writer: &'a mut dyn Writer,
    pub(crate) names: &'a HashMap<FunctionId, String>,
}

impl SerializeContext<'_> {
    /// Writes a function reference as a length-prefixed name, resolved
    /// through the program fragment being serialized.
    pub fn write_function_ref(&mut self, id: FunctionId) -> bool {
        let name = self
            .names
            .get(&id)
            .expect("FunctionId not present in the program fragment being serialized");
        write_length_prefixed_bytes(self.writer, name.as_bytes())
    }
}

/// The reading counterpart of [`SerializeContext`].
pub struct DeserializeContext<'a> {
    pub reader: &'a mut dyn Reader,
    pub(crate) ids: &'a HashMap<String, FunctionId>,
}

impl DeserializeContext<'_> {
    /// Reads a length-prefixed name and resolves it against the
    /// functions declared so far in the program being deserialized.
    pub fn read_function_ref(&mut self) -> Result<FunctionId, DeserializeError> {
        let name = read_length_prefixed_string(self.reader).ok_or(DeserializeError::UnexpectedEof {
            context: "function reference name",
        })?;
        self.ids
            .get(&name)
            .copied()
            .ok_or(DeserializeError::UnknownFunction { name })
    }
}

fn write_length_prefixed_bytes(w: &mut dyn Writer, bytes: &[u8]) -> bool {
    w.write_bytes(&(bytes.len() as u32).to_le_bytes()) && w.write_bytes(bytes)
}

fn read_length_prefixed_string(r: &mut dyn Reader) -> Option<String> {
    let len_bytes = r.read_bytes(4)?;
    let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    let bytes = r.read_bytes(len)?;
    String::from_utf8(bytes).ok()
}

/// Serializes `program` into `writer`.
pub fn serialize_program<Set: InstructionSet>(
    program: &ProgramFragment<Set>,
    writer: &mut dyn Writer,
) -> bool {
    let names: HashMap<FunctionId, String> = program
        .functions()
        .map(|(id, f)| (id, f.name().to_owned()))
        .collect();

    if !writer.write_bytes(&(program.function_count() as u32).to_le_bytes()) {
        return false;
    }

    let mut offset_slots = Vec::with_capacity(program.function_count());
    for (_, f) in program.functions() {
        offset_slots.push(writer.allocate(4));
        if !write_length_prefixed_bytes(writer, f.name().as_bytes()) {
            return false;
        }
        if !varint::write_u64(writer, f.parameter_count() as u64)
            || !varint::write_u64(writer, f.return_count() as u64)
        {
            return false;
        }
    }

    for ((_, f), offset_slot) in program.functions().zip(offset_slots) {
        let body_start = writer.cursor() as u32;
        if !writer.write_at(offset_slot, &body_start.to_le_bytes()) {
            return false;
        }
        let length_slot = writer.allocate(2);
        let body_begin = writer.cursor();
        if !write_function_body(f, writer, &names) {
            return false;
        }
        let body_len = (writer.cursor() - body_begin) as u16;
        if !writer.write_at(length_slot, &body_len.to_le_bytes()) {
            return false;
        }
    }

    true
}

fn write_function_body<Set: InstructionSet>(
    f: &Function<Set>,
    writer: &mut dyn Writer,
    names: &HashMap<FunctionId, String>,
) -> bool {
    let metadata = Set::metadata();
    let cells = f.cells();
    let mut i = 0usize;
    while i < cells.len() {
        let opcode = cells[i].as_type::<OpCode>();
        if opcode.0 as usize >= metadata.len() {
            return false;
        }
        let meta = &metadata[opcode.0 as usize];
        if !writer.write_bytes(&opcode.0.to_le_bytes()) {
            return false;
        }
        let immediate_cells = meta.immediate_value_count;
        let immediates = &cells[i + 1..i + 1 + immediate_cells];
        let mut ctx = SerializeContext { writer, names };
        if !(meta.write_immediates)(immediates, &mut ctx) {
            return false;
        }
        i += 1 + immediate_cells;
    }
    true
}

/// Deserializes a program fragment from `reader`.
pub fn deserialize_program<Set: InstructionSet>(
    reader: &mut dyn Reader,
) -> Result<ProgramFragment<Set>, DeserializeError> {
    let count = read_u32(reader, "function count")? as usize;

    struct Declared {
        name: String,
        offset: u32,
        parameters: u32,
        returns: u32,
    }

    let mut declared = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = read_u32(reader, "function body offset")?;
        let name = read_length_prefixed_string(reader).ok_or(DeserializeError::UnexpectedEof {
            context: "function name",
        })?;
        let parameters = varint::read_u64(reader).ok_or(DeserializeError::UnexpectedEof {
            context: "parameter count",
        })? as u32;
        let returns = varint::read_u64(reader).ok_or(DeserializeError::UnexpectedEof {
            context: "return count",
        })? as u32;
        declared.push(Declared {
            name,
            offset,
            parameters,
            returns,
        });
    }

    let mut program = ProgramFragment::<Set>::new();
    let mut ids = HashMap::new();
    for d in &declared {
        let id = program.declare(d.name.clone(), d.parameters, d.returns);
        ids.insert(d.name.clone(), id);
    }

    for d in &declared {
        let _ = d.offset; // bodies are read in declaration order; the offset
                          // table exists to let non-streaming readers seek.
        let len = read_u16(reader, "function body length")? as usize;
        let body_start = reader.cursor();
        let id = ids[&d.name];
        let cells = read_function_body::<Set>(reader, &ids, body_start, len, &d.name)?;
        let consumed = reader.cursor() - body_start;
        if consumed != len {
            return Err(DeserializeError::BodyLengthMismatch {
                name: d.name.clone(),
                declared: len,
                consumed,
            });
        }
        program.function_mut(id).set_cells(cells);
    }

    Ok(program)
}

fn read_function_body<Set: InstructionSet>(
    reader: &mut dyn Reader,
    ids: &HashMap<String, FunctionId>,
    body_start: usize,
    len: usize,
    name: &str,
) -> Result<Vec<Value>, DeserializeError> {
    let metadata = Set::metadata();
    let mut cells = Vec::new();
    while reader.cursor() - body_start < len {
        let opcode = read_u16(reader, "opcode")?;
        if opcode as usize >= metadata.len() {
            return Err(DeserializeError::InvalidOpcode { opcode });
        }
        cells.push(Value::new(OpCode(opcode)));
        let meta = &metadata[opcode as usize];
        let mut ctx = DeserializeContext { reader, ids };
        let immediates = (meta.read_immediates)(meta.immediate_value_count, &mut ctx)
            .ok_or(DeserializeError::UnexpectedEof {
                context: "instruction immediates",
            })?;
        cells.extend(immediates);
    }
    if reader.cursor() - body_start != len {
        return Err(DeserializeError::BodyLengthMismatch {
            name: name.to_owned(),
            declared: len,
            consumed: reader.cursor() - body_start,
        });
    }
    Ok(cells)
}

fn read_u32(r: &mut dyn Reader, context: &'static str) -> Result<u32, DeserializeError> {
    let bytes = r
        .read_bytes(4)
        .ok_or(DeserializeError::UnexpectedEof { context })?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u16(r: &mut dyn Reader, context: &'static str) -> Result<u16, DeserializeError> {
    let bytes = r
        .read_bytes(2)
        .ok_or(DeserializeError::UnexpectedEof { context })?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefixed_round_trip() {
        let mut w = ByteWriter::new();
        assert!(write_length_prefixed_bytes(&mut w, b"fib"));
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(read_length_prefixed_string(&mut r).unwrap(), "fib");
    }
}
