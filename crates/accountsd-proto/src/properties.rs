use crate::payload::{get_str, put_str};
use crate::{ObjectPath, ProtoError};
use bytes::{Buf, BufMut, BytesMut};

/// Property snapshot of one group as transmitted by `GetAll`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupProperties {
    pub gid: u64,
    pub group_name: String,
    pub local_group: bool,
    pub users: Vec<ObjectPath>, // sorted by the sender
}

const PROPERTIES_VERSION: u8 = 1;

pub fn encode_properties_v1(p: &GroupProperties) -> Result<BytesMut, ProtoError> {
    let mut out = BytesMut::with_capacity(1 + 8 + 2 + p.group_name.len() + 1 + 2 + p.users.len() * 40);
    out.put_u8(PROPERTIES_VERSION);
    out.put_u64_le(p.gid);
    put_str(&mut out, &p.group_name)?;
    out.put_u8(p.local_group as u8);
    if p.users.len() > u16::MAX as usize {
        return Err(ProtoError::FieldTooLong(p.users.len()));
    }
    out.put_u16_le(p.users.len() as u16);
    for u in &p.users {
        put_str(&mut out, u.as_str())?;
    }
    Ok(out)
}

pub fn decode_properties_v1(mut p: &[u8]) -> Result<GroupProperties, ProtoError> {
    if p.remaining() < 1 {
        return Err(ProtoError::BadPayload);
    }
    let ver = p.get_u8();
    if ver != PROPERTIES_VERSION {
        return Err(ProtoError::UnsupportedVersion(ver));
    }
    if p.remaining() < 8 {
        return Err(ProtoError::BadPayload);
    }
    let gid = p.get_u64_le();
    let group_name = get_str(&mut p)?;
    if p.remaining() < 1 + 2 {
        return Err(ProtoError::BadPayload);
    }
    let local_group = p.get_u8() != 0;
    let n = p.get_u16_le() as usize;
    let mut users = Vec::with_capacity(n);
    for _ in 0..n {
        users.push(ObjectPath::parse(&get_str(&mut p)?)?);
    }
    Ok(GroupProperties {
        gid,
        group_name,
        local_group,
        users,
    })
}
