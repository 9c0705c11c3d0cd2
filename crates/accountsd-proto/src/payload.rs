use crate::{EventType, ObjectPath, Opcode, ProtoError, Status};
use bytes::{Buf, BufMut, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub event_type: EventType,
    pub path: ObjectPath,
}

pub fn encode_request(op: Opcode, payload: &[u8]) -> BytesMut {
    // frame: [u32 len][u8 opcode][payload]
    let len = 1 + payload.len();
    let mut out = BytesMut::with_capacity(4 + len);
    out.put_u32_le(len as u32);
    out.put_u8(op as u8);
    out.extend_from_slice(payload);
    out
}

pub fn encode_response(status: Status, payload: &[u8]) -> BytesMut {
    let len = 1 + payload.len();
    let mut out = BytesMut::with_capacity(4 + len);
    out.put_u32_le(len as u32);
    out.put_u8(status as u8);
    out.extend_from_slice(payload);
    out
}

/// Error replies carry a single message string.
pub fn encode_error_response(status: Status, message: &str) -> BytesMut {
    let mut body = BytesMut::with_capacity(2 + message.len());
    // messages longer than a field are cut rather than failing the reply
    let msg = truncate_utf8(message, u16::MAX as usize);
    body.put_u16_le(msg.len() as u16);
    body.extend_from_slice(msg.as_bytes());
    encode_response(status, &body)
}

pub fn decode_error_message(p: &[u8]) -> String {
    let mut p = p;
    get_str(&mut p).unwrap_or_default()
}

pub(crate) fn put_str(out: &mut BytesMut, s: &str) -> Result<(), ProtoError> {
    if s.len() > u16::MAX as usize {
        return Err(ProtoError::FieldTooLong(s.len()));
    }
    out.put_u16_le(s.len() as u16);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn get_str(p: &mut &[u8]) -> Result<String, ProtoError> {
    if p.remaining() < 2 {
        return Err(ProtoError::BadPayload);
    }
    let len = p.get_u16_le() as usize;
    if p.remaining() < len {
        return Err(ProtoError::BadPayload);
    }
    let s = std::str::from_utf8(&p[..len])
        .map_err(|_| ProtoError::InvalidUtf8)?
        .to_string();
    p.advance(len);
    Ok(s)
}

fn get_path(p: &mut &[u8]) -> Result<ObjectPath, ProtoError> {
    ObjectPath::parse(&get_str(p)?)
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn encode_path_only(path: &ObjectPath) -> Result<BytesMut, ProtoError> {
    let mut out = BytesMut::with_capacity(2 + path.as_str().len());
    put_str(&mut out, path.as_str())?;
    Ok(out)
}

pub fn decode_path_only(mut p: &[u8]) -> Result<ObjectPath, ProtoError> {
    get_path(&mut p)
}

/// Payload shared by SetGroupName (path, new name) and Add/RemoveUser (path, user path).
pub fn encode_path_and_arg(path: &ObjectPath, arg: &str) -> Result<BytesMut, ProtoError> {
    let mut out = BytesMut::with_capacity(4 + path.as_str().len() + arg.len());
    put_str(&mut out, path.as_str())?;
    put_str(&mut out, arg)?;
    Ok(out)
}

pub fn decode_path_and_arg(mut p: &[u8]) -> Result<(ObjectPath, String), ProtoError> {
    let path = get_path(&mut p)?;
    let arg = get_str(&mut p)?;
    Ok((path, arg))
}

pub fn encode_path_list(paths: &[ObjectPath]) -> Result<BytesMut, ProtoError> {
    let mut out = BytesMut::with_capacity(4 + paths.len() * 40);
    out.put_u32_le(paths.len() as u32);
    for p in paths {
        put_str(&mut out, p.as_str())?;
    }
    Ok(out)
}

pub fn decode_path_list(mut p: &[u8]) -> Result<Vec<ObjectPath>, ProtoError> {
    if p.remaining() < 4 {
        return Err(ProtoError::BadPayload);
    }
    let count = p.get_u32_le() as usize;
    // each entry needs at least its length prefix
    if p.remaining() < count.saturating_mul(2) {
        return Err(ProtoError::BadPayload);
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(get_path(&mut p)?);
    }
    Ok(out)
}

pub fn encode_push_event_payload(ev: &PushEvent) -> Result<BytesMut, ProtoError> {
    let mut out = BytesMut::with_capacity(1 + 2 + ev.path.as_str().len());
    out.put_u8(ev.event_type as u8);
    put_str(&mut out, ev.path.as_str())?;
    Ok(out)
}

pub fn decode_push_event_payload(mut p: &[u8]) -> Result<PushEvent, ProtoError> {
    if p.remaining() < 1 {
        return Err(ProtoError::BadPayload);
    }
    let event_type = match p.get_u8() {
        1 => EventType::Changed,
        _ => return Err(ProtoError::BadPayload),
    };
    let path = get_path(&mut p)?;
    Ok(PushEvent { event_type, path })
}
