#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    GetAll = 0x01,
    SetGroupName = 0x02,
    AddUser = 0x03,
    RemoveUser = 0x04,
    Ping = 0x05,
    ListGroups = 0x06,

    Subscribe = 0x20,
    Unsubscribe = 0x21,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Opcode::GetAll),
            0x02 => Ok(Opcode::SetGroupName),
            0x03 => Ok(Opcode::AddUser),
            0x04 => Ok(Opcode::RemoveUser),
            0x05 => Ok(Opcode::Ping),
            0x06 => Ok(Opcode::ListGroups),
            0x20 => Ok(Opcode::Subscribe),
            0x21 => Ok(Opcode::Unsubscribe),
            other => Err(other),
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,

    ErrBadPayload = 0x10,
    ErrDenied = 0x11,
    ErrFailed = 0x12,
    ErrInternal = 0x13,
    ErrTooLarge = 0x14,

    PushEvent = 0x80,
}

impl Status {
    pub fn is_error(self) -> bool {
        !matches!(self, Status::Ok | Status::PushEvent)
    }
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Status::Ok,
            0x01 => Status::NotFound,
            0x10 => Status::ErrBadPayload,
            0x11 => Status::ErrDenied,
            0x12 => Status::ErrFailed,
            0x13 => Status::ErrInternal,
            0x14 => Status::ErrTooLarge,
            0x80 => Status::PushEvent,
            _ => Status::ErrInternal,
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EventType {
    /// Properties of the object changed; receivers re-fetch.
    Changed = 1,
}

/// Authorization action required by every group mutation.
pub const ACTION_USER_ADMINISTRATION: &str = "org.freedesktop.accounts.user-administration";
