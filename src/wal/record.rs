use crate::catalog::schema::{Column, Index, Table, View};
use crate::catalog::uid::{DETACHED_UID, Uid};
use crate::catalog::{Alter, DbObject, Delete, DropObject, Field, Record, Update};
use crate::error::FormatError;
use crate::wal::codec::{
    ByteSource, Tag, data_type_from_tag, data_type_tag, decode_value, encode_value, get_i64,
    get_len, get_string, get_u8, put_i32, put_i64, put_string, put_u8,
};

/// Where a decoded object gets its uid from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The offset of its tag byte in the durable log.
    Log,
    /// Not read from the log; the uid is [`DETACHED_UID`].
    Detached,
}

fn opt_uid(v: Option<Uid>) -> Uid {
    v.unwrap_or(0)
}

fn uid_opt(v: Uid) -> Option<Uid> {
    (v != 0).then_some(v)
}

fn put_fields(buf: &mut Vec<u8>, fields: &[Field]) {
    put_i32(buf, fields.len() as i32);
    for f in fields {
        put_i64(buf, f.column);
        encode_value(buf, &f.value);
    }
}

fn get_fields(src: &mut dyn ByteSource, max: usize) -> Result<Vec<Field>, FormatError> {
    let n = get_len(src, max)?;
    let mut fields = Vec::with_capacity(n.min(64));
    for _ in 0..n {
        let column = get_i64(src)?;
        let value = decode_value(src, max)?;
        fields.push(Field::new(column, value));
    }
    Ok(fields)
}

/// Appends the encoding of `object` to `buf`. The object's own uid is not
/// written.
pub fn encode_object(buf: &mut Vec<u8>, object: &DbObject) {
    match object {
        DbObject::Table(t) => {
            put_u8(buf, Tag::Table as u8);
            put_string(buf, &t.name);
        }
        DbObject::Column(c) => {
            put_u8(buf, Tag::Column as u8);
            put_string(buf, &c.name);
            put_u8(buf, data_type_tag(c.data_type));
            put_i64(buf, c.table);
        }
        DbObject::Record(r) => {
            put_u8(buf, Tag::Record as u8);
            put_i64(buf, r.table);
            put_fields(buf, &r.fields);
        }
        DbObject::Update(u) => {
            put_u8(buf, Tag::Update as u8);
            put_i64(buf, u.table);
            put_i64(buf, u.defpos);
            put_fields(buf, &u.fields);
        }
        DbObject::Delete(d) => {
            put_u8(buf, Tag::Delete as u8);
            put_i64(buf, d.table);
            put_i64(buf, d.delpos);
        }
        DbObject::Alter(a) => {
            put_u8(buf, Tag::Alter as u8);
            put_i64(buf, a.target);
            put_i64(buf, opt_uid(a.parent));
            put_string(buf, &a.name);
            put_u8(buf, a.data_type.map(data_type_tag).unwrap_or(0));
        }
        DbObject::Drop(d) => {
            put_u8(buf, Tag::Drop as u8);
            put_i64(buf, d.target);
            put_i64(buf, opt_uid(d.parent));
        }
        DbObject::View(v) => {
            put_u8(buf, Tag::View as u8);
            put_string(buf, &v.name);
            put_string(buf, &v.definition);
        }
        DbObject::Index(i) => {
            put_u8(buf, Tag::Index as u8);
            put_i64(buf, i.table);
            put_u8(buf, u8::from(i.primary));
            put_i32(buf, i.columns.len() as i32);
            for c in &i.columns {
                put_i64(buf, *c);
            }
            put_i64(buf, opt_uid(i.references));
        }
    }
}

/// Encodes `object` into a fresh buffer.
pub fn encoded(object: &DbObject) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_object(&mut buf, object);
    buf
}

/// One record of the log: an object, or the marker closing the objects of
/// one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Object(DbObject),
    CommitEnd { records: usize },
}

/// Appends the marker that closes a commit of `records` objects.
pub fn encode_commit_end(buf: &mut Vec<u8>, records: usize) {
    put_u8(buf, Tag::CommitEnd as u8);
    put_i32(buf, records as i32);
}

/// Encoded length of a commit marker.
pub const COMMIT_END_LEN: usize = 5;

/// Decodes the next log record, object or commit marker.
pub fn decode_entry(
    src: &mut dyn ByteSource,
    origin: Origin,
    max: usize,
) -> Result<LogEntry, FormatError> {
    let offset = src.position();
    let byte = get_u8(src)?;
    match Tag::from_u8(byte) {
        Some(Tag::CommitEnd) => Ok(LogEntry::CommitEnd {
            records: get_len(src, max)?,
        }),
        Some(tag) => decode_body(src, tag, byte, offset, origin, max).map(LogEntry::Object),
        None => Err(FormatError::UnknownTag { tag: byte, offset }),
    }
}

/// Decodes one database object starting at the source's current position.
/// String lengths and element counts above `max` are rejected.
pub fn decode_object(
    src: &mut dyn ByteSource,
    origin: Origin,
    max: usize,
) -> Result<DbObject, FormatError> {
    let offset = src.position();
    let byte = get_u8(src)?;
    let tag = Tag::from_u8(byte).ok_or(FormatError::UnknownTag { tag: byte, offset })?;
    decode_body(src, tag, byte, offset, origin, max)
}

fn decode_body(
    src: &mut dyn ByteSource,
    tag: Tag,
    byte: u8,
    offset: u64,
    origin: Origin,
    max: usize,
) -> Result<DbObject, FormatError> {
    let id = match origin {
        Origin::Log => offset as Uid,
        Origin::Detached => DETACHED_UID,
    };
    Ok(match tag {
        Tag::Table => DbObject::Table(Table::new(id, get_string(src, max)?)),
        Tag::Column => {
            let name = get_string(src, max)?;
            let data_type = data_type_from_tag(get_u8(src)?)?;
            let table = get_i64(src)?;
            DbObject::Column(Column {
                id,
                name,
                table,
                data_type,
            })
        }
        Tag::Record => DbObject::Record(Record {
            id,
            table: get_i64(src)?,
            fields: get_fields(src, max)?,
        }),
        Tag::Update => DbObject::Update(Update {
            id,
            table: get_i64(src)?,
            defpos: get_i64(src)?,
            fields: get_fields(src, max)?,
        }),
        Tag::Delete => DbObject::Delete(Delete {
            id,
            table: get_i64(src)?,
            delpos: get_i64(src)?,
        }),
        Tag::Alter => {
            let target = get_i64(src)?;
            let parent = uid_opt(get_i64(src)?);
            let name = get_string(src, max)?;
            let data_type = match get_u8(src)? {
                0 => None,
                b => Some(data_type_from_tag(b)?),
            };
            DbObject::Alter(Alter {
                id,
                target,
                parent,
                name,
                data_type,
            })
        }
        Tag::Drop => DbObject::Drop(DropObject {
            id,
            target: get_i64(src)?,
            parent: uid_opt(get_i64(src)?),
        }),
        Tag::View => DbObject::View(View {
            id,
            name: get_string(src, max)?,
            definition: get_string(src, max)?,
        }),
        Tag::Index => {
            let table = get_i64(src)?;
            let primary = get_u8(src)? != 0;
            let n = get_len(src, max)?;
            let mut columns = Vec::with_capacity(n.min(64));
            for _ in 0..n {
                columns.push(get_i64(src)?);
            }
            let references = uid_opt(get_i64(src)?);
            DbObject::Index(Index::new(id, table, primary, columns, references))
        }
        _ => return Err(FormatError::NotAnObject { tag: byte, offset }),
    })
}
